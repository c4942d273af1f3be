// Shared fixtures for the end-to-end scenarios.
#![allow(dead_code)]

use evidence_container::{
    Appearance, CompatibilityFlags, ContainerError, ContainerWriter, Edition, Guid, Owner, Profile, Result,
    SealedContainer, SigningIdentity, Storage,
};
use serde_json::json;
use std::path::Path;

pub const TEXT: &str = "a0000000-0000-4000-8000-000000000001";
pub const BLOB: &str = "a0000000-0000-4000-8000-000000000002";
pub const IMAGE_TYPE: &str = "b0000000-0000-4000-8000-000000000001";
pub const FILE_TYPE: &str = "b0000000-0000-4000-8000-000000000002";
pub const ACQUIRE: &str = "c0000000-0000-4000-8000-000000000001";
pub const CARVE: &str = "c0000000-0000-4000-8000-000000000002";

pub fn guid(text: &str) -> Guid {
    text.parse().unwrap()
}

pub fn disk_profile() -> Profile {
    Profile::from_document(json!({
        "Profile": {
            "Name": "DiskForensics",
            "Version": "1.0",
            "Description": "Disk images and files carved from them",
            "DataTypeCatalog": [
                {"DataType": {"guid": TEXT, "Name": "Text", "MimeType": "text/plain"}},
                {"DataType": {"guid": BLOB, "Name": "Binary", "MimeType": "application/octet-stream"}}
            ],
            "EntityTypeCatalog": [
                {"EntityType": {
                    "guid": IMAGE_TYPE, "Name": "DiskImage", "Severity": "Strict",
                    "Values": [
                        {"Name": "image", "DataType": BLOB, "Usage": "Required"},
                        {"Name": "serial", "DataType": TEXT, "Usage": "Optional"}
                    ]
                }},
                {"EntityType": {
                    "guid": FILE_TYPE, "Name": "CarvedFile", "Severity": "Open",
                    "Values": [
                        {"Name": "content", "DataType": BLOB, "Usage": "Required"}
                    ]
                }}
            ],
            "ProvenanceInterfaceCatalog": [
                {"ProvenanceInterface": {
                    "guid": ACQUIRE, "Name": "Acquire", "Inputs": [], "Output": IMAGE_TYPE
                }},
                {"ProvenanceInterface": {
                    "guid": CARVE, "Name": "Carve", "Inputs": [IMAGE_TYPE], "Output": FILE_TYPE,
                    "Parameter": {"Name": "command", "DataType": TEXT}
                }}
            ]
        }
    }))
    .unwrap()
}

pub fn owner() -> Owner {
    Owner::new("State Forensics Lab", "Ann Example", "ann@lab.example").with_role("examiner")
}

pub fn edition(software: &str) -> Edition {
    Edition::new(software, owner())
}

/// First edition holding one conforming disk image (entity 1).
pub fn acquire<S: Storage>(
    storage: S,
    profile: Option<&Profile>,
    identity: SigningIdentity,
) -> Result<SealedContainer<S>> {
    let mut writer = ContainerWriter::create(
        storage,
        edition("acquire 2.1"),
        profile,
        identity,
        CompatibilityFlags::default(),
    )?;
    let mut image = writer.new_entity(1, Some(guid(IMAGE_TYPE)), guid(ACQUIRE), Some("laptop disk"), &[])?;
    image
        .add_value("image", Some(guid(BLOB)), Appearance::Plain, "\u{1}\u{2}sector data")?
        .add_value("serial", Some(guid(TEXT)), Appearance::Plain, "WD-1234")?;
    image.close()?;
    Ok(writer.finish_initialization()?)
}

/// Follow-up edition carving one file (entity 2) out of entity 1.
pub fn carve<S: Storage>(container: SealedContainer<S>, identity: SigningIdentity) -> Result<SealedContainer<S>> {
    let content = container.read_value(1, "image")?;
    let mut writer = container.start_transformation(edition("carve 0.9"), identity)?;
    let id = writer.next_entity_id();
    let mut file = writer.new_entity(id, Some(guid(FILE_TYPE)), guid(CARVE), Some("carved.bin"), &[1])?;
    file.add_value("content", Some(guid(BLOB)), Appearance::Plain, content)?
        .set_provenance_parameter("command", Some(guid(TEXT)), Appearance::Plain, "carve --offset 0")?;
    file.close()?;
    Ok(writer.finish_transformation()?)
}

pub fn identity() -> SigningIdentity {
    SigningIdentity::self_signed("Ann Example").unwrap()
}

/// Write a file into a container directory behind the storage's back.
pub fn plant(root: &Path, rel: &str, content: &[u8]) {
    let full = root.join(rel);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}

pub fn is_contract(err: &ContainerError) -> bool {
    matches!(err, ContainerError::Contract(_))
}
