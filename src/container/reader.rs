// 📖 Container reader
// Rebuilds editions, entity index and certificates from storage. Everything
// that does not conform is reported as a Structure message; only an unreadable
// manifest (or no readable edition at all) aborts the open.

use super::layout::{self, Manifest, FORMAT_REVISION, MANIFEST_PATH, OLDEST_READABLE_REVISION, PROFILE_PATH};
use super::model::{Appearance, Edition, EntityId, EntityRecord, SignatureRecord};
use super::CompatibilityFlags;
use crate::crypto::Certificate;
use crate::error::{ContainerError, Result};
use crate::storage::Storage;
use crate::validation::{MessageSink, Tally, Topic, ValidationMessage};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

pub(crate) struct Loaded {
    pub editions: Vec<Edition>,
    pub entities: BTreeMap<EntityId, EntityRecord>,
    pub certificates: BTreeMap<String, Certificate>,
}

pub(crate) fn load<S: Storage + ?Sized>(
    storage: &S,
    handler: &mut dyn MessageSink,
    flags: &CompatibilityFlags,
) -> Result<Loaded> {
    let mut sink = Tally::new(handler);
    let mut referenced: HashSet<String> = HashSet::new();

    let manifest: Manifest = layout::from_json(&storage.read(MANIFEST_PATH)?, MANIFEST_PATH)?;
    referenced.insert(MANIFEST_PATH.to_string());
    check_revision(manifest.format, flags, &mut sink);

    // Editions
    let mut editions = Vec::with_capacity(manifest.editions.len());
    for id in &manifest.editions {
        let path = layout::edition_path(id);
        referenced.insert(path.clone());
        match read_record::<Edition, _>(storage, &path) {
            Ok(edition) if edition.id != *id => structure_error(
                &mut sink,
                format!("{} holds edition {} instead of {}", path, edition.id, id),
            ),
            Ok(edition) => editions.push(edition),
            Err(reason) => structure_error(&mut sink, reason),
        }
    }
    if editions.is_empty() {
        return Err(ContainerError::format("container has no readable edition"));
    }
    check_edition_chain(&editions, &mut sink);

    // Entity index
    let mut entities: BTreeMap<EntityId, EntityRecord> = BTreeMap::new();
    for edition in &editions {
        for &id in &edition.new_entities {
            let path = layout::entity_path(id);
            referenced.insert(path.clone());
            if entities.contains_key(&id) {
                structure_error(&mut sink, format!("entity {} is introduced by more than one edition", id));
                continue;
            }
            match read_record::<EntityRecord, _>(storage, &path) {
                Ok(record) if record.id != id => {
                    structure_error(&mut sink, format!("{} holds entity {} instead of {}", path, record.id, id))
                }
                Ok(record) => {
                    entities.insert(id, record);
                }
                Err(reason) => structure_error(&mut sink, reason),
            }
        }
    }
    check_entities(storage, &editions, &entities, &mut referenced, &mut sink)?;

    // Certificates
    let mut certificates = BTreeMap::new();
    for fingerprint in signer_fingerprints(&editions, &entities) {
        let path = layout::certificate_path(&fingerprint);
        referenced.insert(path.clone());
        match read_record::<Certificate, _>(storage, &path) {
            Ok(cert) if cert.fingerprint() != fingerprint => structure_error(
                &mut sink,
                format!("{} does not match its fingerprint", path),
            ),
            Ok(cert) => {
                certificates.insert(fingerprint, cert);
            }
            Err(reason) => structure_error(&mut sink, reason),
        }
    }

    if storage.exists(PROFILE_PATH)? {
        referenced.insert(PROFILE_PATH.to_string());
    }
    if flags.report_unreferenced_entries {
        for path in storage.list_paths()? {
            if !referenced.contains(&path) {
                structure_error(&mut sink, format!("storage entry '{}' is not part of the container", path));
            }
        }
    }

    if sink.passed() {
        sink.push(ValidationMessage::success(
            Topic::Structure,
            format!(
                "container structure is valid: {} edition(s), {} entities",
                editions.len(),
                entities.len()
            ),
        ));
    }
    debug!(editions = editions.len(), entities = entities.len(), errors = sink.errors(), "container opened");

    Ok(Loaded {
        editions,
        entities,
        certificates,
    })
}

fn structure_error(sink: &mut dyn MessageSink, text: impl Into<String>) {
    sink.push(ValidationMessage::error(Topic::Structure, text));
}

fn read_record<T: serde::de::DeserializeOwned, S: Storage + ?Sized>(
    storage: &S,
    path: &str,
) -> std::result::Result<T, String> {
    let bytes = storage.read(path).map_err(|e| format!("{} cannot be read: {}", path, e))?;
    layout::from_json(&bytes, path).map_err(|e| e.to_string())
}

fn check_revision(format: u32, flags: &CompatibilityFlags, sink: &mut dyn MessageSink) {
    if format > FORMAT_REVISION {
        structure_error(
            sink,
            format!("layout revision {} is newer than supported revision {}", format, FORMAT_REVISION),
        );
    } else if format < OLDEST_READABLE_REVISION {
        structure_error(sink, format!("layout revision {} is not supported", format));
    } else if format < FORMAT_REVISION && !flags.accept_legacy_format {
        structure_error(
            sink,
            format!("layout revision {} is a legacy revision and legacy layouts are not accepted", format),
        );
    }
}

fn check_edition_chain(editions: &[Edition], sink: &mut dyn MessageSink) {
    for (index, edition) in editions.iter().enumerate() {
        if edition.master_signature.is_none() {
            structure_error(sink, format!("edition {} has no master signature", edition.id));
        }

        match (index, &edition.history_link) {
            (0, Some(_)) => structure_error(
                sink,
                format!("first edition {} must not carry a history link", edition.id),
            ),
            (0, None) => {}
            (_, None) => structure_error(sink, format!("edition {} has no history link", edition.id)),
            (_, Some(link)) if link.previous_edition != editions[index - 1].id => structure_error(
                sink,
                format!(
                    "history link of edition {} points to {} instead of {}",
                    edition.id,
                    link.previous_edition,
                    editions[index - 1].id
                ),
            ),
            (_, Some(_)) => {}
        }

        let new: BTreeSet<_> = edition.new_entities.iter().collect();
        for id in &edition.removed_entities {
            if new.contains(id) {
                structure_error(
                    sink,
                    format!("entity {} is both new and removed in edition {}", id, edition.id),
                );
            }
        }
    }
}

fn check_entities<S: Storage + ?Sized>(
    storage: &S,
    editions: &[Edition],
    entities: &BTreeMap<EntityId, EntityRecord>,
    referenced: &mut HashSet<String>,
    sink: &mut dyn MessageSink,
) -> Result<()> {
    for edition in editions {
        for id in &edition.removed_entities {
            if !entities.contains_key(id) {
                structure_error(
                    sink,
                    format!("edition {} removes unknown entity {}", edition.id, id),
                );
            }
        }
    }

    for entity in entities.values() {
        for p in &entity.predecessors {
            if !entities.contains_key(p) {
                structure_error(sink, format!("entity {} derives from unknown entity {}", entity.id, p));
            }
        }

        let mut names = HashSet::new();
        for value in &entity.values {
            if !names.insert(value.name.as_str()) {
                structure_error(
                    sink,
                    format!("entity {} has duplicate value name '{}'", entity.id, value.name),
                );
            }
        }

        for value in entity.all_values() {
            match (&value.appearance, &value.content_path) {
                (Appearance::Plain, Some(path)) => {
                    referenced.insert(path.clone());
                    if !storage.exists(path)? {
                        structure_error(
                            sink,
                            format!("content of value '{}' of entity {} is missing", value.name, entity.id),
                        );
                    }
                }
                (Appearance::Plain, None) => structure_error(
                    sink,
                    format!("plain value '{}' of entity {} has no content path", value.name, entity.id),
                ),
                (Appearance::Suppressed, Some(_)) => structure_error(
                    sink,
                    format!(
                        "suppressed value '{}' of entity {} must not reference content",
                        value.name, entity.id
                    ),
                ),
                (Appearance::Suppressed, None) => {}
            }
        }
    }
    Ok(())
}

/// Every certificate fingerprint a signature in the container refers to.
fn signer_fingerprints(editions: &[Edition], entities: &BTreeMap<EntityId, EntityRecord>) -> BTreeSet<String> {
    let edition_signatures = editions.iter().flat_map(|e| {
        e.master_signature
            .iter()
            .chain(e.history_link.iter().map(|l| &l.signature))
    });
    let value_signatures = entities
        .values()
        .flat_map(|entity| entity.all_values().map(|v| &v.signature));

    edition_signatures
        .chain(value_signatures)
        .map(|s: &SignatureRecord| s.certificate.clone())
        .collect()
}
