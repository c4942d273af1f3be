// 📋 Validation Report Aggregator
// Four independent message collections (structure, value, certificate, profile)
// with one verdict, rendered as a `ContainerReport` JSON document or CSV rows.

use crate::container::{Edition, EntityRecord, SealedContainer, ValueRecord};
use crate::error::{OperationContext, Result};
use crate::storage::Storage;
use crate::validation::{MessageSink, Severity, ValidationMessage, ValidationMessageCollection};
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use std::path::Path;
use tracing::{debug, warn};

/// The validation concern a message collection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concern {
    Structure,
    Value,
    Certificate,
    Profile,
}

impl Concern {
    pub const ALL: [Concern; 4] = [Concern::Structure, Concern::Value, Concern::Certificate, Concern::Profile];

    pub fn name(&self) -> &'static str {
        match self {
            Concern::Structure => "Structure",
            Concern::Value => "Value",
            Concern::Certificate => "Certificate",
            Concern::Profile => "Profile",
        }
    }
}

pub struct ValidationReport {
    source: String,
    timestamp: DateTime<Utc>,
    collections: [ValidationMessageCollection; 4],
    container: Option<JsonValue>,
    observer: Option<Box<dyn MessageSink + Send>>,
}

impl ValidationReport {
    pub fn new(source: impl Into<String>) -> Self {
        ValidationReport {
            source: source.into(),
            timestamp: Utc::now(),
            collections: Concern::ALL.map(|c| ValidationMessageCollection::new(c.name())),
            container: None,
            observer: None,
        }
    }

    /// Forward every message to `observer` as well.
    pub fn with_observer(mut self, observer: impl MessageSink + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Handler for one concern. Messages land in its collection, the log and the observer.
    pub fn sink(&mut self, concern: Concern) -> ReportSink<'_> {
        ReportSink {
            collection: &mut self.collections[concern as usize],
            observer: self.observer.as_mut(),
        }
    }

    pub fn collection(&self, concern: Concern) -> &ValidationMessageCollection {
        &self.collections[concern as usize]
    }

    pub fn collections(&self) -> impl Iterator<Item = &ValidationMessageCollection> {
        self.collections.iter()
    }

    pub fn contains_error(&self) -> bool {
        self.collections.iter().any(ValidationMessageCollection::contains_error)
    }

    pub fn summary(&self) -> &'static str {
        if self.contains_error() {
            Severity::Error.as_str()
        } else {
            Severity::Success.as_str()
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Record the structure of an opened container for the report document.
    ///
    /// Only a structurally valid container is rendered: nothing is attached
    /// once the Structure collection holds an error. Returns whether it was attached.
    pub fn attach_container<S: Storage>(&mut self, container: &SealedContainer<S>) -> bool {
        if self.collection(Concern::Structure).contains_error() {
            debug!(source = %self.source, "structure errors reported; container snapshot omitted");
            return false;
        }
        self.container = Some(container_snapshot(container));
        true
    }

    pub fn has_container(&self) -> bool {
        self.container.is_some()
    }

    // ========================================================================
    // RENDERING
    // ========================================================================

    pub fn to_document(&self) -> JsonValue {
        let collections: Vec<JsonValue> = self
            .collections
            .iter()
            .filter(|c| !c.is_empty())
            .map(|c| {
                json!({
                    "name": c.name,
                    "count": c.len(),
                    "summary": c.summary(),
                    "ValidationMessage": c.iter().map(|m| json!({
                        "severity": m.severity.as_str(),
                        "topic": m.topic.as_str(),
                        "text": m.text,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();

        let mut report = json!({
            "Source": self.source,
            "Timestamp": self.timestamp.to_rfc3339(),
            "Summary": self.summary(),
            "ValidationMessageCollection": collections,
        });
        if let Some(container) = &self.container {
            report["Container"] = container.clone();
        }
        json!({ "ContainerReport": report })
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.to_document()).op_context(|| "serializing report".to_string())?;
        std::fs::write(path, bytes).op_context(|| format!("writing report {}", path.display()))?;
        debug!(path = %path.display(), "report written");
        Ok(())
    }

    /// One row per message: collection, severity, topic, text.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).op_context(|| format!("creating {}", path.display()))?;
        writer
            .write_record(["collection", "severity", "topic", "text"])
            .op_context(|| format!("writing {}", path.display()))?;
        for collection in &self.collections {
            for m in collection.iter() {
                writer
                    .write_record([collection.name.as_str(), m.severity.as_str(), m.topic.as_str(), m.text.as_str()])
                    .op_context(|| format!("writing {}", path.display()))?;
            }
        }
        writer.flush().op_context(|| format!("flushing {}", path.display()))?;
        Ok(())
    }
}

/// Handler bound to one collection of a report.
pub struct ReportSink<'r> {
    collection: &'r mut ValidationMessageCollection,
    observer: Option<&'r mut Box<dyn MessageSink + Send>>,
}

impl MessageSink for ReportSink<'_> {
    fn push(&mut self, message: ValidationMessage) {
        if message.is_error() {
            warn!(collection = %self.collection.name, topic = message.topic.as_str(), "{}", message.text);
        } else {
            debug!(collection = %self.collection.name, topic = message.topic.as_str(), "{}", message.text);
        }
        if let Some(observer) = &mut self.observer {
            observer.push(message.clone());
        }
        self.collection.push(message);
    }
}

// ============================================================================
// CONTAINER SNAPSHOT
// ============================================================================

/// Editions and entity index of a container, without any value content.
pub fn container_snapshot<S: Storage>(container: &SealedContainer<S>) -> JsonValue {
    json!({
        "CurrentEdition": edition_snapshot(container.current_edition()),
        "HistoryEditions": container
            .history_editions()
            .iter()
            .map(edition_snapshot)
            .collect::<Vec<_>>(),
        "Entities": container
            .entities()
            .map(|e| entity_snapshot(e, container.is_removed(e.id)))
            .collect::<Vec<_>>(),
    })
}

fn edition_snapshot(edition: &Edition) -> JsonValue {
    let owner = &edition.owner;
    json!({
        "id": edition.id.to_string(),
        "timestamp": edition.timestamp.to_rfc3339(),
        "software": edition.software,
        "profile": { "name": edition.profile_name, "version": edition.profile_version },
        "owner": {
            "institute": owner.institute,
            "operator": owner.operator,
            "email": owner.email,
            "role": owner.role,
        },
        "copyright": edition.copyright,
        "comment": edition.comment,
        "salt_state": edition.salt_state,
        "new_entities": edition.new_entities,
        "removed_entities": edition.removed_entities,
    })
}

fn entity_snapshot(entity: &EntityRecord, removed: bool) -> JsonValue {
    json!({
        "id": entity.id,
        "label": entity.label_or_placeholder(),
        "removed": removed,
        "type": entity.entity_type.map(|t| t.to_string()),
        "provenance": {
            "interface": entity.provenance.interface.to_string(),
            "parameter": entity.provenance.parameter.as_ref().map(value_snapshot),
        },
        "predecessors": entity.predecessors,
        "values": entity.values.iter().map(value_snapshot).collect::<Vec<_>>(),
    })
}

fn value_snapshot(value: &ValueRecord) -> JsonValue {
    json!({
        "name": value.name,
        "appearance": value.appearance.as_str(),
        "type": value.data_type.map(|t| t.to_string()),
        "size": value.size,
    })
}
