// 🧩 Entity types
// An entity type declares the values its entities carry. Validation accumulates
// every finding instead of stopping at the first one.

use super::{element_body, parse_guid, parse_optional_guid, Catalog, CatalogItem, Guid, ItemHeader, ProvenanceInterface};
use crate::container::EntityRecord;
use crate::error::Result;
use crate::validation::{MessageSink, Tally, Topic, ValidationMessage};
use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TypeSeverity {
    /// Values not declared by the type are errors
    Strict,
    /// Undeclared values are tolerated
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Usage {
    Required,
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDescriptor {
    pub name: String,
    pub description: String,
    pub data_type: Option<Guid>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub header: ItemHeader,
    pub severity: TypeSeverity,
    pub values: Vec<ValueDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EntityTypeElement {
    #[serde(rename = "guid")]
    guid: String,
    name: String,
    #[serde(default)]
    description: String,
    severity: TypeSeverity,
    #[serde(default)]
    values: Vec<ValueDescriptorElement>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValueDescriptorElement {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    data_type: Option<String>,
    usage: Usage,
}

impl CatalogItem for EntityType {
    const ELEMENT: &'static str = "EntityType";
    const REQUIRED_FIELDS: &'static [&'static str] = &["Severity"];

    fn header(&self) -> &ItemHeader {
        &self.header
    }

    fn parse(element: &JsonValue) -> Result<Self> {
        let raw: EntityTypeElement = element_body(element, Self::ELEMENT)?;
        let context = format!("EntityType '{}'", raw.name);
        let id = parse_guid(&raw.guid, &context)?;

        let mut values = Vec::with_capacity(raw.values.len());
        for v in raw.values {
            let data_type = parse_optional_guid(
                v.data_type.as_deref(),
                &format!("{} value '{}'", context, v.name),
            )?;
            values.push(ValueDescriptor {
                name: v.name,
                description: v.description,
                data_type,
                usage: v.usage,
            });
        }

        Ok(EntityType {
            header: ItemHeader {
                id,
                name: raw.name,
                description: raw.description,
            },
            severity: raw.severity,
            values,
        })
    }
}

impl EntityType {
    pub fn descriptor(&self, name: &str) -> Option<&ValueDescriptor> {
        self.values.iter().find(|d| d.name == name)
    }

    /// Check one entity against this type.
    ///
    /// Order: declared values, undeclared values (Strict only), provenance.
    /// A single Success message is emitted when nothing failed.
    pub fn validate(
        &self,
        entity: &EntityRecord,
        provenance: &Catalog<ProvenanceInterface>,
        sink: &mut dyn MessageSink,
    ) -> bool {
        let mut tally = Tally::new(sink);
        let who = format!("Entity {} '{}'", entity.id, entity.label_or_placeholder());

        for descriptor in &self.values {
            match entity.value(&descriptor.name) {
                Some(value) if value.data_type != descriptor.data_type => {
                    tally.push(ValidationMessage::error(
                        Topic::Entity,
                        format!(
                            "{}: data type mismatch for value '{}' (expected {}, found {})",
                            who,
                            descriptor.name,
                            describe_type(descriptor.data_type),
                            describe_type(value.data_type)
                        ),
                    ));
                }
                Some(_) => {}
                None if descriptor.usage == Usage::Required => {
                    tally.push(ValidationMessage::error(
                        Topic::Entity,
                        format!(
                            "{}: required value missing '{}' (entity type '{}')",
                            who, descriptor.name, self.header.name
                        ),
                    ));
                }
                None => {}
            }
        }

        if self.severity == TypeSeverity::Strict {
            for value in &entity.values {
                if self.descriptor(&value.name).is_none() {
                    tally.push(ValidationMessage::error(
                        Topic::Entity,
                        format!(
                            "{}: unexpected value '{}' not declared by strict entity type '{}'",
                            who, value.name, self.header.name
                        ),
                    ));
                }
            }
        }

        match provenance.find(&entity.provenance.interface) {
            None => {
                tally.push(ValidationMessage::error(
                    Topic::Entity,
                    format!(
                        "{}: unknown provenance interface {}",
                        who, entity.provenance.interface
                    ),
                ));
            }
            Some(interface) if Some(interface.output) != entity.entity_type => {
                tally.push(ValidationMessage::error(
                    Topic::Entity,
                    format!(
                        "{}: provenance mismatch, interface '{}' produces {} but the entity is {}",
                        who,
                        interface.name(),
                        interface.output,
                        describe_type(entity.entity_type)
                    ),
                ));
            }
            Some(_) => {}
        }

        if tally.passed() {
            tally.push(ValidationMessage::success(
                Topic::Entity,
                format!(
                    "Entity {} '{}' conforms to entity type '{}'",
                    entity.id,
                    entity.label_or_placeholder(),
                    self.header.name
                ),
            ));
        }

        tally.passed()
    }
}

fn describe_type(data_type: Option<Guid>) -> String {
    data_type.map_or_else(|| "untyped".to_string(), |g| g.to_string())
}
