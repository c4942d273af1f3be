use super::{element_body, parse_guid, parse_optional_guid, CatalogItem, Guid, ItemHeader};
use crate::error::Result;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Optional parameter a provenance interface accepts (e.g. a tool command line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub description: String,
    pub data_type: Option<Guid>,
}

/// A process that produces entities of one type from entities of other types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceInterface {
    pub header: ItemHeader,
    pub inputs: Vec<Guid>,
    pub output: Guid,
    pub parameter: Option<ParameterDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProvenanceElement {
    #[serde(rename = "guid")]
    guid: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    inputs: Vec<String>,
    output: String,
    #[serde(default)]
    parameter: Option<ParameterElement>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterElement {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    data_type: Option<String>,
}

impl CatalogItem for ProvenanceInterface {
    const ELEMENT: &'static str = "ProvenanceInterface";
    const REQUIRED_FIELDS: &'static [&'static str] = &["Output"];

    fn header(&self) -> &ItemHeader {
        &self.header
    }

    fn parse(element: &JsonValue) -> Result<Self> {
        let raw: ProvenanceElement = element_body(element, Self::ELEMENT)?;
        let context = format!("ProvenanceInterface '{}'", raw.name);
        let id = parse_guid(&raw.guid, &context)?;

        let inputs = raw
            .inputs
            .iter()
            .map(|input| parse_guid(input, &format!("{} input", context)))
            .collect::<Result<Vec<_>>>()?;
        let output = parse_guid(&raw.output, &format!("{} output", context))?;

        let parameter = match raw.parameter {
            Some(p) => Some(ParameterDescriptor {
                data_type: parse_optional_guid(p.data_type.as_deref(), &format!("{} parameter", context))?,
                name: p.name,
                description: p.description,
            }),
            None => None,
        };

        Ok(ProvenanceInterface {
            header: ItemHeader {
                id,
                name: raw.name,
                description: raw.description,
            },
            inputs,
            output,
            parameter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_provenance_interface() {
        let item = ProvenanceInterface::parse(&json!({
            "guid": "44444444-0000-4000-8000-000000000001",
            "Name": "Carve",
            "Description": "File carving from a disk image",
            "Inputs": ["22222222-0000-4000-8000-000000000001"],
            "Output": "22222222-0000-4000-8000-000000000002",
            "Parameter": {"Name": "command", "DataType": "11111111-0000-4000-8000-000000000001"}
        }))
        .unwrap();

        assert_eq!(item.name(), "Carve");
        assert_eq!(item.inputs.len(), 1);
        assert_eq!(item.parameter.as_ref().unwrap().name, "command");
        assert!(item.parameter.unwrap().data_type.is_some());
    }

    #[test]
    fn test_missing_output_is_format_error() {
        let err = ProvenanceInterface::parse(&json!({
            "guid": "44444444-0000-4000-8000-000000000001",
            "Name": "Carve"
        }))
        .unwrap_err();
        assert!(matches!(err, crate::error::ContainerError::Format(_)));
    }

    #[test]
    fn test_malformed_input_guid() {
        let err = ProvenanceInterface::parse(&json!({
            "guid": "44444444-0000-4000-8000-000000000001",
            "Name": "Carve",
            "Inputs": ["zzz"],
            "Output": "22222222-0000-4000-8000-000000000002"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("malformed guid"));
    }
}
