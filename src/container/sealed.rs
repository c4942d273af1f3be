// 🔒 Sealed container
// Durable, read-only view of the last committed edition and everything before it.

use super::layout::{self, PROFILE_PATH};
use super::lifecycle::{ContainerWriter, LifecycleState};
use super::model::{Appearance, Edition, EntityId, EntityRecord, ValueRecord};
use super::reader;
use super::CompatibilityFlags;
use crate::crypto::{Certificate, CryptoProvider, Ed25519Crypto, SigningIdentity};
use crate::error::{ContainerError, Result};
use crate::profile::Profile;
use crate::storage::Storage;
use crate::validation::MessageSink;
use std::collections::BTreeMap;

pub struct SealedContainer<S: Storage> {
    pub(crate) storage: S,
    pub(crate) crypto: Box<dyn CryptoProvider>,
    pub(crate) flags: CompatibilityFlags,
    /// Oldest first; never empty
    pub(crate) editions: Vec<Edition>,
    pub(crate) entities: BTreeMap<EntityId, EntityRecord>,
    pub(crate) certificates: BTreeMap<String, Certificate>,
}

impl<S: Storage> SealedContainer<S> {
    pub(crate) fn from_parts(
        storage: S,
        crypto: Box<dyn CryptoProvider>,
        flags: CompatibilityFlags,
        editions: Vec<Edition>,
        entities: BTreeMap<EntityId, EntityRecord>,
        certificates: BTreeMap<String, Certificate>,
    ) -> Self {
        SealedContainer {
            storage,
            crypto,
            flags,
            editions,
            entities,
            certificates,
        }
    }

    /// Rebuild the in-memory state from storage.
    ///
    /// Structural nonconformities are reported through `handler`; signatures are not checked here.
    pub fn open(storage: S, handler: &mut dyn MessageSink, flags: CompatibilityFlags) -> Result<Self> {
        let loaded = reader::load(&storage, handler, &flags)?;
        Ok(SealedContainer {
            storage,
            crypto: Box::new(Ed25519Crypto),
            flags,
            editions: loaded.editions,
            entities: loaded.entities,
            certificates: loaded.certificates,
        })
    }

    pub fn with_crypto(mut self, crypto: impl CryptoProvider + 'static) -> Self {
        self.crypto = Box::new(crypto);
        self
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::Sealed(self.editions.len())
    }

    pub fn flags(&self) -> &CompatibilityFlags {
        &self.flags
    }

    // ========================================================================
    // EDITIONS
    // ========================================================================

    pub fn current_edition(&self) -> &Edition {
        // `editions` is never empty: both the seal and the reader guarantee one edition
        &self.editions[self.editions.len() - 1]
    }

    /// All sealed editions, oldest first.
    pub fn editions(&self) -> &[Edition] {
        &self.editions
    }

    /// Editions before the current one, oldest first.
    pub fn history_editions(&self) -> &[Edition] {
        &self.editions[..self.editions.len() - 1]
    }

    pub fn history_edition_count(&self) -> usize {
        self.editions.len() - 1
    }

    // ========================================================================
    // ENTITIES
    // ========================================================================

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Every entity, ordered by id. Removed entities are included.
    pub fn entities(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values()
    }

    pub fn entity(&self, id: EntityId) -> Result<&EntityRecord> {
        self.entities
            .get(&id)
            .ok_or_else(|| ContainerError::not_found(format!("entity {}", id)))
    }

    /// Whether any edition marked the entity removed.
    pub fn is_removed(&self, id: EntityId) -> bool {
        self.editions.iter().any(|e| e.removed_entities.contains(&id))
    }

    /// Edition that introduced an entity.
    pub fn introduced_in(&self, id: EntityId) -> Option<&Edition> {
        self.editions.iter().find(|e| e.new_entities.contains(&id))
    }

    /// Content of a named value. Suppressed content is not recoverable.
    pub fn read_value(&self, entity: EntityId, name: &str) -> Result<Vec<u8>> {
        let record = self.entity(entity)?;
        let value = record
            .value(name)
            .ok_or_else(|| ContainerError::not_found(format!("value '{}' of entity {}", name, entity)))?;
        self.read_content(value)
    }

    pub fn read_content(&self, value: &ValueRecord) -> Result<Vec<u8>> {
        match (&value.appearance, &value.content_path) {
            (Appearance::Suppressed, _) | (_, None) => Err(ContainerError::not_found(format!(
                "content of value '{}' is suppressed",
                value.name
            ))),
            (Appearance::Plain, Some(path)) => self.storage.read(path),
        }
    }

    pub fn certificate(&self, fingerprint: &str) -> Option<&Certificate> {
        self.certificates.get(fingerprint)
    }

    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.values()
    }

    /// Profile document embedded at creation, if any.
    pub fn embedded_profile(&self) -> Result<Option<Profile>> {
        if !self.storage.exists(PROFILE_PATH)? {
            return Ok(None);
        }
        Profile::from_slice(&self.storage.read(PROFILE_PATH)?).map(Some)
    }

    /// Entities covered by the master signature of edition `index`, ordered by id.
    pub(crate) fn covered_entities(&self, index: usize) -> Vec<&EntityRecord> {
        let mut ids: Vec<EntityId> = self.editions[..=index]
            .iter()
            .flat_map(|e| e.new_entities.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.iter().filter_map(|id| self.entities.get(id)).collect()
    }

    pub(crate) fn master_content(&self, index: usize) -> Result<serde_json::Value> {
        layout::master_content(&self.editions[index], &self.covered_entities(index))
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// Open a new edition layered on this one (Sealed → Transforming).
    pub fn start_transformation(self, next: Edition, identity: SigningIdentity) -> Result<ContainerWriter<S>> {
        ContainerWriter::transforming(
            self.storage,
            self.crypto,
            self.flags,
            self.editions,
            self.entities,
            self.certificates,
            next,
            identity,
        )
    }

    pub fn into_storage(self) -> S {
        self.storage
    }
}
