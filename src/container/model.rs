// 🧾 Container data model
// Editions, entities and values as they are persisted. Records are plain
// serde values; the lifecycle module decides when they may be created.

use crate::catalog::Guid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sequence number of an entity within one container
pub type EntityId = u64;

/// Placeholder used in messages and reports for entities without a label
pub const UNLABELED: &str = "Unlabeled";

// ============================================================================
// EDITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub institute: String,
    pub operator: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Owner {
    pub fn new(institute: impl Into<String>, operator: impl Into<String>, email: impl Into<String>) -> Self {
        Owner {
            institute: institute.into(),
            operator: operator.into(),
            email: email.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Whether value digests of an edition are randomized before hashing.
///
/// `PerValue` draws a fresh salt for every value and hashes `salt || content`,
/// so equal evidence in two containers does not produce equal digests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaltState {
    #[default]
    Unsalted,
    PerValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Fingerprint of the certificate under `certificates/`
    pub certificate: String,
    /// Hex-encoded signature
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLink {
    pub previous_edition: Guid,
    /// Signature over the hash of the previous edition's master signature
    pub signature: SignatureRecord,
}

/// One sealed snapshot of the container's evolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    pub id: Guid,
    pub timestamp: DateTime<Utc>,
    pub software: String,
    #[serde(default)]
    pub profile_name: String,
    #[serde(default)]
    pub profile_version: String,
    pub owner: Owner,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub salt_state: SaltState,
    #[serde(default)]
    pub new_entities: Vec<EntityId>,
    #[serde(default)]
    pub removed_entities: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_signature: Option<SignatureRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_link: Option<HistoryLink>,
}

impl Edition {
    /// Unsealed edition stamped now, with a fresh id.
    pub fn new(software: impl Into<String>, owner: Owner) -> Self {
        Edition {
            id: Guid::new_v4(),
            timestamp: Utc::now(),
            software: software.into(),
            profile_name: String::new(),
            profile_version: String::new(),
            owner,
            copyright: None,
            comment: None,
            salt_state: SaltState::Unsalted,
            new_entities: Vec::new(),
            removed_entities: Vec::new(),
            master_signature: None,
            history_link: None,
        }
    }

    pub fn with_profile(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.profile_name = name.into();
        self.profile_version = version.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_copyright(mut self, copyright: impl Into<String>) -> Self {
        self.copyright = Some(copyright.into());
        self
    }

    pub fn with_salt_state(mut self, salt_state: SaltState) -> Self {
        self.salt_state = salt_state;
        self
    }

    pub fn is_sealed(&self) -> bool {
        self.master_signature.is_some()
    }

    /// The edition without its signatures: the part covered by the master signature.
    pub fn body(&self) -> Edition {
        Edition {
            master_signature: None,
            history_link: None,
            ..self.clone()
        }
    }
}

// ============================================================================
// ENTITY & VALUE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Appearance {
    #[default]
    Plain,
    /// Redacted: digest, size and signature are kept, the content is not persisted
    Suppressed,
}

impl Appearance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Appearance::Plain => "plain",
            Appearance::Suppressed => "suppressed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<Guid>,
    #[serde(default)]
    pub appearance: Appearance,
    /// Length of the original content, also for suppressed values
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    /// Hex digest of `salt || content`
    pub digest: String,
    pub signature: SignatureRecord,
    /// Storage path of the content; absent when suppressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub interface: Guid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<ValueRecord>,
}

/// One closed, immutable item of evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<Guid>,
    pub provenance: ProvenanceRecord,
    #[serde(default)]
    pub predecessors: Vec<EntityId>,
    #[serde(default)]
    pub values: Vec<ValueRecord>,
}

impl EntityRecord {
    pub fn label_or_placeholder(&self) -> &str {
        self.label.as_deref().unwrap_or(UNLABELED)
    }

    pub fn value(&self, name: &str) -> Option<&ValueRecord> {
        self.values.iter().find(|v| v.name == name)
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// Attached values followed by the provenance parameter, if any.
    pub fn all_values(&self) -> impl Iterator<Item = &ValueRecord> {
        self.values.iter().chain(self.provenance.parameter.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_value(name: &str) -> ValueRecord {
        ValueRecord {
            name: name.to_string(),
            data_type: None,
            appearance: Appearance::Plain,
            size: 3,
            salt: None,
            digest: "00".to_string(),
            signature: SignatureRecord {
                certificate: "fp".to_string(),
                signature: "sig".to_string(),
            },
            content_path: Some("values/1/0.bin".to_string()),
        }
    }

    #[test]
    fn test_edition_body_strips_signatures() {
        let mut edition = Edition::new("acquire 1.0", Owner::new("Lab", "Ann", "ann@lab.example"));
        edition.master_signature = Some(SignatureRecord {
            certificate: "fp".to_string(),
            signature: "aa".to_string(),
        });

        assert!(edition.is_sealed());
        let body = edition.body();
        assert!(!body.is_sealed());
        assert_eq!(body.id, edition.id);
    }

    #[test]
    fn test_entity_value_lookup_and_label() {
        let entity = EntityRecord {
            id: 1,
            label: None,
            entity_type: None,
            provenance: ProvenanceRecord {
                interface: Guid::new_v4(),
                parameter: Some(sample_value("command")),
            },
            predecessors: vec![],
            values: vec![sample_value("image"), sample_value("hash")],
        };

        assert_eq!(entity.label_or_placeholder(), UNLABELED);
        assert!(entity.has_value("hash"));
        assert!(!entity.has_value("command"));
        assert_eq!(entity.all_values().count(), 3);
    }

    #[test]
    fn test_edition_serde_omits_empty_optionals() {
        let edition = Edition::new("acquire 1.0", Owner::new("Lab", "Ann", "ann@lab.example"))
            .with_profile("Disk", "1.0")
            .with_salt_state(SaltState::PerValue);

        let json = serde_json::to_value(&edition).unwrap();
        assert!(json.get("master_signature").is_none());
        assert!(json.get("comment").is_none());
        assert_eq!(json["salt_state"], "PerValue");

        let back: Edition = serde_json::from_value(json).unwrap();
        assert_eq!(back, edition);
    }
}
