// 📐 Profile - the schema a container is validated against
// A profile document carries Name/Version/Description and three catalog
// sections. The whole document is checked for conformance before any catalog
// is loaded, so a bad document never yields a half-built profile.

pub mod validator;

pub use validator::ProfileValidator;

use crate::catalog::{Catalog, CatalogItem, DataType, EntityType, ProvenanceInterface};
use crate::error::{ContainerError, OperationContext, Result};
use serde_json::Value as JsonValue;
use std::path::Path;
use tracing::debug;

/// Root element of a profile document
pub const PROFILE_ELEMENT: &str = "Profile";

const DATA_TYPE_CATALOG: &str = "DataTypeCatalog";
const ENTITY_TYPE_CATALOG: &str = "EntityTypeCatalog";
const PROVENANCE_CATALOG: &str = "ProvenanceInterfaceCatalog";

#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub version: String,
    pub description: String,
    pub data_types: Catalog<DataType>,
    pub entity_types: Catalog<EntityType>,
    pub provenance_interfaces: Catalog<ProvenanceInterface>,
    /// The document the profile was loaded from, kept for embedding into containers
    document: JsonValue,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).op_context(|| format!("reading profile {}", path.display()))?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let document: JsonValue = serde_json::from_slice(bytes)
            .map_err(|e| ContainerError::format(format!("profile document is not valid JSON: {}", e)))?;
        Self::from_document(document)
    }

    pub fn from_document(document: JsonValue) -> Result<Self> {
        let problems = conformance_problems(&document);
        if !problems.is_empty() {
            return Err(ContainerError::format(format!(
                "profile document does not conform: {}",
                problems.join("; ")
            )));
        }

        let root = &document[PROFILE_ELEMENT];
        let profile = Profile {
            name: root["Name"].as_str().unwrap_or_default().to_string(),
            version: root["Version"].as_str().unwrap_or_default().to_string(),
            description: root
                .get("Description")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
            data_types: Catalog::load(&root[DATA_TYPE_CATALOG])?,
            entity_types: Catalog::load(&root[ENTITY_TYPE_CATALOG])?,
            provenance_interfaces: Catalog::load(&root[PROVENANCE_CATALOG])?,
            document,
        };

        debug!(
            profile = %profile.name,
            version = %profile.version,
            data_types = profile.data_types.len(),
            entity_types = profile.entity_types.len(),
            provenance_interfaces = profile.provenance_interfaces.len(),
            "loaded profile"
        );
        Ok(profile)
    }

    pub fn document(&self) -> &JsonValue {
        &self.document
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.document).op_context(|| "serializing profile".to_string())
    }
}

// ============================================================================
// DOCUMENT CONFORMANCE
// ============================================================================

/// Every structural problem of a profile document; empty when it conforms.
pub fn conformance_problems(document: &JsonValue) -> Vec<String> {
    let mut problems = Vec::new();

    let Some(root) = document.get(PROFILE_ELEMENT).and_then(JsonValue::as_object) else {
        problems.push(format!("root element '{}' is missing", PROFILE_ELEMENT));
        return problems;
    };

    for field in ["Name", "Version"] {
        match root.get(field) {
            Some(JsonValue::String(s)) if !s.trim().is_empty() => {}
            _ => problems.push(format!("'{}' must be a non-empty string", field)),
        }
    }
    if let Some(description) = root.get("Description") {
        if !description.is_string() {
            problems.push("'Description' must be a string".to_string());
        }
    }

    check_section::<DataType>(root.get(DATA_TYPE_CATALOG), DATA_TYPE_CATALOG, &mut problems);
    check_section::<EntityType>(root.get(ENTITY_TYPE_CATALOG), ENTITY_TYPE_CATALOG, &mut problems);
    check_section::<ProvenanceInterface>(root.get(PROVENANCE_CATALOG), PROVENANCE_CATALOG, &mut problems);

    problems
}

fn check_section<T: CatalogItem>(section: Option<&JsonValue>, section_name: &str, problems: &mut Vec<String>) {
    let Some(entries) = section.and_then(JsonValue::as_array) else {
        problems.push(format!("'{}' must be an array", section_name));
        return;
    };

    for (position, entry) in entries.iter().enumerate() {
        let Some(element) = entry.get(T::ELEMENT).and_then(JsonValue::as_object) else {
            problems.push(format!("{}[{}] is not a '{}' element", section_name, position, T::ELEMENT));
            continue;
        };

        if !element.get("guid").is_some_and(JsonValue::is_string) {
            problems.push(format!("{}[{}] has no 'guid' attribute", section_name, position));
        }
        if !element.get("Name").is_some_and(JsonValue::is_string) {
            problems.push(format!("{}[{}] has no 'Name'", section_name, position));
        }
        for field in T::REQUIRED_FIELDS {
            if !element.contains_key(*field) {
                problems.push(format!("{}[{}] has no '{}'", section_name, position, field));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value as JsonValue};

    pub const TEXT: &str = "a0000000-0000-4000-8000-000000000001";
    pub const BLOB: &str = "a0000000-0000-4000-8000-000000000002";
    pub const IMAGE_TYPE: &str = "b0000000-0000-4000-8000-000000000001";
    pub const FILE_TYPE: &str = "b0000000-0000-4000-8000-000000000002";
    pub const ACQUIRE: &str = "c0000000-0000-4000-8000-000000000001";
    pub const CARVE: &str = "c0000000-0000-4000-8000-000000000002";

    /// Small disk-forensics profile used across unit tests.
    pub fn disk_profile_document() -> JsonValue {
        json!({
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
        })
    }
}
