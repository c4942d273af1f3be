// 🏛️ Catalog Engine
// Keyed collections of profile items (data types, entity types, provenance
// interfaces). The catalog is agnostic of the item kind; each kind knows its
// element tag and how to parse its own fields.

pub mod data_type;
pub mod entity_type;
pub mod provenance;

pub use data_type::DataType;
pub use entity_type::{EntityType, TypeSeverity, Usage, ValueDescriptor};
pub use provenance::{ParameterDescriptor, ProvenanceInterface};

use crate::error::{ContainerError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

/// Container-scoped 128-bit identifier used by every catalog item.
pub type Guid = Uuid;

/// Parse a guid attribute. Malformed guids are format errors.
pub fn parse_guid(text: &str, context: &str) -> Result<Guid> {
    Uuid::parse_str(text.trim())
        .map_err(|e| ContainerError::format(format!("{}: malformed guid '{}': {}", context, text, e)))
}

/// Empty strings stand for "no reference".
pub(crate) fn parse_optional_guid(text: Option<&str>, context: &str) -> Result<Option<Guid>> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(t) => parse_guid(t, context).map(Some),
    }
}

// ============================================================================
// ITEM CAPABILITY
// ============================================================================

/// Fields every catalog item carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemHeader {
    pub id: Guid,
    pub name: String,
    pub description: String,
}

/// A profile item that can be loaded from its catalog element.
pub trait CatalogItem: Sized {
    /// Element tag wrapping each item inside its catalog section
    const ELEMENT: &'static str;

    /// Fields that must be present in the element besides `guid` and `Name`
    const REQUIRED_FIELDS: &'static [&'static str] = &[];

    fn header(&self) -> &ItemHeader;

    fn parse(element: &JsonValue) -> Result<Self>;

    fn id(&self) -> Guid {
        self.header().id
    }

    fn name(&self) -> &str {
        &self.header().name
    }
}

/// Deserialize an element body into an item-specific shape.
pub(crate) fn element_body<T: DeserializeOwned>(element: &JsonValue, tag: &str) -> Result<T> {
    serde_json::from_value(element.clone())
        .map_err(|e| ContainerError::format(format!("{} element: {}", tag, e)))
}

// ============================================================================
// CATALOG
// ============================================================================

/// Items in insertion order with O(1) lookup by id.
#[derive(Debug, Clone)]
pub struct Catalog<T> {
    items: Vec<T>,
    index: HashMap<Guid, usize>,
}

impl<T> Default for Catalog<T> {
    fn default() -> Self {
        Catalog {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: CatalogItem> Catalog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog section: an array of `{ "<ELEMENT>": { ... } }` entries.
    pub fn load(section: &JsonValue) -> Result<Self> {
        let entries = section.as_array().ok_or_else(|| {
            ContainerError::format(format!("{} catalog must be an array", T::ELEMENT))
        })?;

        let mut catalog = Catalog::new();
        for (position, entry) in entries.iter().enumerate() {
            let element = entry.get(T::ELEMENT).ok_or_else(|| {
                ContainerError::format(format!(
                    "{} catalog entry {} is not a {} element",
                    T::ELEMENT,
                    position,
                    T::ELEMENT
                ))
            })?;
            catalog.insert(T::parse(element)?)?;
        }
        Ok(catalog)
    }

    /// Add an item. A second item with the same id is rejected.
    pub fn insert(&mut self, item: T) -> Result<()> {
        let id = item.id();
        if self.index.contains_key(&id) {
            return Err(ContainerError::format(format!(
                "duplicate {} guid {} ('{}')",
                T::ELEMENT,
                id,
                item.name()
            )));
        }
        self.index.insert(id, self.items.len());
        self.items.push(item);
        Ok(())
    }

    pub fn get(&self, id: &Guid) -> Result<&T> {
        self.find(id)
            .ok_or_else(|| ContainerError::not_found(format!("{} {}", T::ELEMENT, id)))
    }

    pub fn find(&self, id: &Guid) -> Option<&T> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn contains(&self, id: &Guid) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
