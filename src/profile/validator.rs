// 🔎 Profile Validator
// Checks every entity of a container against a profile. Findings accumulate so
// a single pass surfaces all defects.

use super::Profile;
use crate::container::{EntityRecord, SealedContainer};
use crate::storage::Storage;
use crate::validation::{MessageSink, Tally, Topic, ValidationMessage};
use tracing::debug;

pub struct ProfileValidator<'p> {
    profile: &'p Profile,
}

impl<'p> ProfileValidator<'p> {
    pub fn new(profile: &'p Profile) -> Self {
        ProfileValidator { profile }
    }

    /// Validate the whole container.
    ///
    /// A profile-name mismatch is fatal: one ContainerProfile error and no entity checks.
    /// A version mismatch is only reported and validation continues.
    pub fn validate_container<S: Storage>(&self, container: &SealedContainer<S>, sink: &mut dyn MessageSink) -> bool {
        let edition = container.current_edition();

        if edition.profile_name != self.profile.name {
            sink.push(ValidationMessage::error(
                Topic::ContainerProfile,
                format!(
                    "container was written for profile '{}' but is validated against profile '{}'",
                    edition.profile_name, self.profile.name
                ),
            ));
            return false;
        }

        if edition.profile_version != self.profile.version {
            sink.push(ValidationMessage::success(
                Topic::ContainerProfile,
                format!(
                    "profile version differs (container '{}', profile '{}'); validation continues",
                    edition.profile_version, self.profile.version
                ),
            ));
        }

        let mut valid = true;
        for entity in container.entities() {
            valid &= self.validate_entity(entity, sink);
        }

        debug!(
            profile = %self.profile.name,
            entities = container.entity_count(),
            valid,
            "profile validation finished"
        );
        valid
    }

    /// Validate one entity against the entity type it references.
    pub fn validate_entity(&self, entity: &EntityRecord, sink: &mut dyn MessageSink) -> bool {
        let entity_type = entity
            .entity_type
            .and_then(|id| self.profile.entity_types.find(&id));

        match entity_type {
            Some(entity_type) => entity_type.validate(entity, &self.profile.provenance_interfaces, sink),
            None => {
                let mut tally = Tally::new(sink);
                tally.push(ValidationMessage::error(
                    Topic::Entity,
                    format!(
                        "Entity {} '{}': unknown entity type {}",
                        entity.id,
                        entity.label_or_placeholder(),
                        entity
                            .entity_type
                            .map_or_else(|| "(untyped)".to_string(), |g| g.to_string())
                    ),
                ));
                tally.passed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse_guid;
    use crate::container::{Appearance, ProvenanceRecord, SignatureRecord, ValueRecord};
    use crate::profile::fixtures::*;

    fn profile() -> Profile {
        Profile::from_document(disk_profile_document()).unwrap()
    }

    fn image_entity(entity_type: Option<&str>) -> EntityRecord {
        EntityRecord {
            id: 1,
            label: None,
            entity_type: entity_type.map(|t| parse_guid(t, "test").unwrap()),
            provenance: ProvenanceRecord {
                interface: parse_guid(ACQUIRE, "test").unwrap(),
                parameter: None,
            },
            predecessors: vec![],
            values: vec![ValueRecord {
                name: "image".to_string(),
                data_type: Some(parse_guid(BLOB, "test").unwrap()),
                appearance: Appearance::Plain,
                size: 4,
                salt: None,
                digest: String::new(),
                signature: SignatureRecord {
                    certificate: String::new(),
                    signature: String::new(),
                },
                content_path: None,
            }],
        }
    }

    #[test]
    fn test_validate_entity_conforming() {
        let profile = profile();
        let mut messages: Vec<ValidationMessage> = Vec::new();

        assert!(ProfileValidator::new(&profile).validate_entity(&image_entity(Some(IMAGE_TYPE)), &mut messages));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.contains("Unlabeled"));
        assert!(messages[0].text.contains("DiskImage"));
    }

    #[test]
    fn test_validate_entity_unknown_type() {
        let profile = profile();
        let mut messages: Vec<ValidationMessage> = Vec::new();

        let unknown = "ffffffff-0000-4000-8000-000000000000";
        assert!(!ProfileValidator::new(&profile).validate_entity(&image_entity(Some(unknown)), &mut messages));
        assert!(messages[0].text.contains("unknown entity type"));

        messages.clear();
        assert!(!ProfileValidator::new(&profile).validate_entity(&image_entity(None), &mut messages));
        assert!(messages[0].text.contains("(untyped)"));
    }
}
