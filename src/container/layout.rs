// 🗂️ Persisted layout
//
// manifest.json                    commit point, written last
// profile.json                     embedded profile document (optional)
// editions/<guid>.json             edition records
// entities/<id>.json               entity records
// values/<id>/<n>.bin              value content
// values/<id>/provenance.bin       provenance parameter content
// certificates/<fingerprint>.json  signer certificates

use super::model::{Edition, EntityId, EntityRecord};
use crate::catalog::Guid;
use crate::error::{ContainerError, OperationContext, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Layout revision written by this crate
pub const FORMAT_REVISION: u32 = 2;

/// Oldest revision that can still be read (with `accept_legacy_format`)
pub const OLDEST_READABLE_REVISION: u32 = 1;

pub const MANIFEST_PATH: &str = "manifest.json";
pub const PROFILE_PATH: &str = "profile.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: u32,
    /// Sealed editions, oldest first
    pub editions: Vec<Guid>,
}

pub fn edition_path(id: &Guid) -> String {
    format!("editions/{}.json", id)
}

pub fn entity_path(id: EntityId) -> String {
    format!("entities/{}.json", id)
}

pub fn value_path(entity: EntityId, index: usize) -> String {
    format!("values/{}/{}.bin", entity, index)
}

pub fn parameter_path(entity: EntityId) -> String {
    format!("values/{}/provenance.bin", entity)
}

pub fn certificate_path(fingerprint: &str) -> String {
    format!("certificates/{}.json", fingerprint)
}

pub fn to_json<T: Serialize>(value: &T, what: &str) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).op_context(|| format!("serializing {}", what))
}

pub fn from_json<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| ContainerError::format(format!("{}: {}", what, e)))
}

/// Structured content covered by an edition's master signature: the edition
/// body plus every entity introduced up to and including that edition.
pub fn master_content(edition: &Edition, entities: &[&EntityRecord]) -> Result<JsonValue> {
    let body = serde_json::to_value(edition.body()).op_context(|| "serializing edition body".to_string())?;
    let entities = serde_json::to_value(entities).op_context(|| "serializing entity index".to_string())?;
    Ok(serde_json::json!({
        "edition": body,
        "entities": entities,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::model::Owner;
    use crate::storage::validate_path;

    #[test]
    fn test_layout_paths_are_valid_storage_paths() {
        let id = Guid::new_v4();
        for path in [
            MANIFEST_PATH.to_string(),
            PROFILE_PATH.to_string(),
            edition_path(&id),
            entity_path(3),
            value_path(3, 0),
            parameter_path(3),
            certificate_path(&"ab".repeat(32)),
        ] {
            assert!(validate_path(&path).is_ok(), "{}", path);
        }
    }

    #[test]
    fn test_master_content_ignores_signatures() {
        let mut edition = Edition::new("acquire", Owner::new("Lab", "Ann", "a@lab.example"));
        let before = master_content(&edition, &[]).unwrap();

        edition.master_signature = Some(crate::container::SignatureRecord {
            certificate: "fp".to_string(),
            signature: "00".to_string(),
        });
        assert_eq!(master_content(&edition, &[]).unwrap(), before);
    }
}
