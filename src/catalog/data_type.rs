use super::{element_body, parse_guid, CatalogItem, ItemHeader};
use crate::error::Result;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Declared kind of raw value content. Content checking itself is not performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
    pub header: ItemHeader,
    pub mime_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DataTypeElement {
    #[serde(rename = "guid")]
    guid: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    mime_type: Option<String>,
}

impl CatalogItem for DataType {
    const ELEMENT: &'static str = "DataType";

    fn header(&self) -> &ItemHeader {
        &self.header
    }

    fn parse(element: &JsonValue) -> Result<Self> {
        let raw: DataTypeElement = element_body(element, Self::ELEMENT)?;
        let id = parse_guid(&raw.guid, &format!("DataType '{}'", raw.name))?;

        Ok(DataType {
            header: ItemHeader {
                id,
                name: raw.name,
                description: raw.description,
            },
            mime_type: raw.mime_type.filter(|m| !m.trim().is_empty()),
        })
    }
}
