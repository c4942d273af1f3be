// Profile validation and report scenarios.

mod common;

use common::*;
use evidence_container::{
    Appearance, CertificateRules, CompatibilityFlags, Concern, ContainerWriter, DirectoryStorage, ProfileValidator,
    SealedContainer, SharedCollection, Topic, ValidationMessage, ValidationReport,
};

#[test]
fn test_conforming_container_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let profile = disk_profile();
    let sealed = carve(
        acquire(DirectoryStorage::open(dir.path()).unwrap(), Some(&profile), identity()).unwrap(),
        identity(),
    )
    .unwrap();
    drop(sealed);

    let mut structure: Vec<ValidationMessage> = Vec::new();
    let container =
        SealedContainer::open(DirectoryStorage::open(dir.path()).unwrap(), &mut structure, CompatibilityFlags::default())
            .unwrap();

    // The embedded document loads back into the same profile
    let embedded = container.embedded_profile().unwrap().unwrap();
    assert_eq!(embedded.name, "DiskForensics");
    assert_eq!(embedded.entity_types.len(), 2);

    let mut messages: Vec<ValidationMessage> = Vec::new();
    assert!(ProfileValidator::new(&embedded).validate_container(&container, &mut messages));
    assert!(messages.iter().all(|m| !m.is_error()), "{:?}", messages);
    assert_eq!(messages.iter().filter(|m| m.topic == Topic::Entity).count(), 2);
    println!("✅ Profile round trip PASSED");
}

#[test]
fn test_profile_validation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let profile = disk_profile();
    let container = acquire(DirectoryStorage::open(dir.path()).unwrap(), Some(&profile), identity()).unwrap();
    let validator = ProfileValidator::new(&profile);

    let mut first: Vec<ValidationMessage> = Vec::new();
    let mut second: Vec<ValidationMessage> = Vec::new();
    let a = validator.validate_container(&container, &mut first);
    let b = validator.validate_container(&container, &mut second);

    assert_eq!(a, b);
    assert_eq!(first, second);
}

#[test]
fn test_profile_name_mismatch_stops_entity_checks() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = ContainerWriter::create(
        DirectoryStorage::open(dir.path()).unwrap(),
        edition("acquire 2.1").with_profile("X", "1.0"),
        None,
        identity(),
        CompatibilityFlags::default(),
    )
    .unwrap();
    // Would fail the profile: unknown entity type
    writer
        .new_entity(1, Some(guid(CARVE)), guid(ACQUIRE), None, &[])
        .unwrap()
        .close()
        .unwrap();
    let container = writer.finish_initialization().unwrap();

    let mut messages: Vec<ValidationMessage> = Vec::new();
    assert!(!ProfileValidator::new(&disk_profile()).validate_container(&container, &mut messages));
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_error());
    assert_eq!(messages[0].topic, Topic::ContainerProfile);
}

#[test]
fn test_profile_version_mismatch_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let container = acquire(DirectoryStorage::open(dir.path()).unwrap(), Some(&disk_profile()), identity()).unwrap();

    let mut newer = disk_profile();
    newer.version = "2.0".to_string();

    let mut messages: Vec<ValidationMessage> = Vec::new();
    assert!(ProfileValidator::new(&newer).validate_container(&container, &mut messages));
    assert_eq!(messages[0].topic, Topic::ContainerProfile);
    assert!(!messages[0].is_error());
    assert!(messages.iter().any(|m| m.topic == Topic::Entity));
}

#[test]
fn test_strict_and_open_entity_types() {
    let dir = tempfile::tempdir().unwrap();
    let profile = disk_profile();
    let mut writer = ContainerWriter::create(
        DirectoryStorage::open(dir.path()).unwrap(),
        edition("acquire 2.1"),
        Some(&profile),
        identity(),
        CompatibilityFlags::default(),
    )
    .unwrap();

    // Strict type with an undeclared value
    let mut image = writer
        .new_entity(1, Some(guid(IMAGE_TYPE)), guid(ACQUIRE), Some("strict"), &[])
        .unwrap();
    image
        .add_value("image", Some(guid(BLOB)), Appearance::Plain, "bytes")
        .unwrap()
        .add_value("notes", Some(guid(TEXT)), Appearance::Plain, "found under desk")
        .unwrap();
    image.close().unwrap();

    // Open type with an undeclared value
    let mut file = writer
        .new_entity(2, Some(guid(FILE_TYPE)), guid(CARVE), Some("open"), &[1])
        .unwrap();
    file.add_value("content", Some(guid(BLOB)), Appearance::Plain, "bytes")
        .unwrap()
        .add_value("notes", Some(guid(TEXT)), Appearance::Plain, "carved at 0x200")
        .unwrap();
    file.close().unwrap();

    // Strict type missing its required value, optional one present
    let mut bare = writer
        .new_entity(3, Some(guid(IMAGE_TYPE)), guid(ACQUIRE), Some("bare"), &[])
        .unwrap();
    bare.add_value("serial", Some(guid(TEXT)), Appearance::Plain, "WD-1").unwrap();
    bare.close().unwrap();

    let container = writer.finish_initialization().unwrap();
    let validator = ProfileValidator::new(&profile);

    let mut strict: Vec<ValidationMessage> = Vec::new();
    assert!(!validator.validate_entity(container.entity(1).unwrap(), &mut strict));
    assert!(strict
        .iter()
        .any(|m| m.is_error() && m.topic == Topic::Entity && m.text.contains("notes")));

    let mut open: Vec<ValidationMessage> = Vec::new();
    assert!(validator.validate_entity(container.entity(2).unwrap(), &mut open));
    assert!(open.iter().all(|m| !m.is_error()));

    let mut required: Vec<ValidationMessage> = Vec::new();
    assert!(!validator.validate_entity(container.entity(3).unwrap(), &mut required));
    let errors: Vec<_> = required.iter().filter(|m| m.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].text.contains("required value missing 'image'"));
}

#[test]
fn test_full_report() {
    let dir = tempfile::tempdir().unwrap();
    let profile = disk_profile();
    drop(
        carve(
            acquire(DirectoryStorage::open(dir.path().join("c")).unwrap(), Some(&profile), identity()).unwrap(),
            identity(),
        )
        .unwrap(),
    );

    let observer = SharedCollection::new("all");
    let mut report = ValidationReport::new("case c").with_observer(observer.clone());
    let container = SealedContainer::open(
        DirectoryStorage::open(dir.path().join("c")).unwrap(),
        &mut report.sink(Concern::Structure),
        CompatibilityFlags::default(),
    )
    .unwrap();
    assert!(report.attach_container(&container));

    assert!(container.verify_entity_value_signatures(&mut report.sink(Concern::Value)));
    // Self-signed without allowance
    assert!(!container
        .validate_certificates(None, &CertificateRules::default(), &mut report.sink(Concern::Certificate))
        .unwrap());
    assert!(ProfileValidator::new(&profile).validate_container(&container, &mut report.sink(Concern::Profile)));

    assert!(report.contains_error());
    assert!(report.collection(Concern::Certificate).contains_error());
    assert!(!report.collection(Concern::Profile).contains_error());
    let total: usize = report.collections().map(|c| c.len()).sum();
    assert_eq!(observer.snapshot().len(), total);

    let doc = report.to_document();
    let root = &doc["ContainerReport"];
    assert_eq!(root["Summary"], "error");
    assert_eq!(root["ValidationMessageCollection"].as_array().unwrap().len(), 4);

    let snapshot = &root["Container"];
    assert_eq!(snapshot["HistoryEditions"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["CurrentEdition"]["new_entities"], serde_json::json!([2]));
    assert_eq!(snapshot["CurrentEdition"]["profile"]["name"], "DiskForensics");
    let carved = &snapshot["Entities"][1];
    assert_eq!(carved["predecessors"], serde_json::json!([1]));
    assert_eq!(carved["provenance"]["parameter"]["name"], "command");
    assert_eq!(carved["values"][0]["appearance"], "plain");
    assert!(carved["values"][0].get("content").is_none());

    let out = dir.path().join("report.json");
    report.write_json(&out).unwrap();
    let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
    assert_eq!(written, doc);
}

#[test]
fn test_parallel_passes_share_one_sink() {
    let dir = tempfile::tempdir().unwrap();
    let profile = disk_profile();
    let container = acquire(DirectoryStorage::open(dir.path()).unwrap(), Some(&profile), identity()).unwrap();
    let shared = SharedCollection::new("parallel");
    let rules = CertificateRules {
        allow_self_signed_certificate: true,
    };

    let mut value_sink = shared.clone();
    let mut certificate_sink = shared.clone();
    let mut profile_sink = shared.clone();

    let (values, certificates, conforms) = std::thread::scope(|scope| {
        let values = scope.spawn(|| container.verify_entity_value_signatures(&mut value_sink));
        let certificates = scope.spawn(|| {
            container
                .validate_certificates(None, &rules, &mut certificate_sink)
                .unwrap()
        });
        let conforms = scope.spawn(|| ProfileValidator::new(&profile).validate_container(&container, &mut profile_sink));
        (
            values.join().unwrap(),
            certificates.join().unwrap(),
            conforms.join().unwrap(),
        )
    });

    assert!(values && certificates && conforms);
    let collected = shared.snapshot();
    assert!(!collected.contains_error());
    assert!(collected.iter().any(|m| m.topic == Topic::Value));
    assert!(collected.iter().any(|m| m.topic == Topic::Certificate));
    assert!(collected.iter().any(|m| m.topic == Topic::Entity));
}

#[test]
fn test_snapshot_omitted_when_structure_is_broken() {
    let dir = tempfile::tempdir().unwrap();
    drop(acquire(DirectoryStorage::open(dir.path()).unwrap(), None, identity()).unwrap());
    plant(dir.path(), "values/7/0.bin", b"stray");

    let flags = CompatibilityFlags {
        report_unreferenced_entries: true,
        ..CompatibilityFlags::default()
    };
    let mut report = ValidationReport::new("broken");
    let container =
        SealedContainer::open(DirectoryStorage::open(dir.path()).unwrap(), &mut report.sink(Concern::Structure), flags)
            .unwrap();

    assert!(report.collection(Concern::Structure).contains_error());
    assert!(!report.attach_container(&container));
    assert!(!report.has_container());
    assert!(report.to_document()["ContainerReport"].get("Container").is_none());
}
