// 🔏 Two-phase seal protocol
//
// create → (new_entity → add_value* → close)* → finish_initialization
// start_transformation → (new_entity … close | remove_entity)* → finish_transformation
//
// Nothing a phase produces is readable as sealed until the seal commits. A seal
// writes every blob first and manifest.json last; on failure the blobs written
// during the attempt are removed and the previous manifest stays in place. The
// writer comes back inside the `SealFailure`, so the storage is never lost.

use super::layout::{self, Manifest, FORMAT_REVISION, MANIFEST_PATH, PROFILE_PATH};
use super::model::{
    Appearance, Edition, EntityId, EntityRecord, HistoryLink, ProvenanceRecord, SaltState, SignatureRecord,
    ValueRecord,
};
use super::sealed::SealedContainer;
use super::CompatibilityFlags;
use crate::catalog::Guid;
use crate::crypto::{Certificate, CryptoProvider, Ed25519Crypto, SigningIdentity};
use crate::error::{ContainerError, Result};
use crate::profile::Profile;
use crate::storage::Storage;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Salt length for `SaltState::PerValue`
const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Initializing,
    Transforming,
    /// Durable state holding this many editions
    Sealed(usize),
}

/// Where a value's content comes from.
#[derive(Debug, Clone)]
pub enum ValueSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl ValueSource {
    fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            ValueSource::Bytes(bytes) => Ok(bytes),
            ValueSource::File(path) => std::fs::read(&path)
                .map_err(|e| ContainerError::failed(format!("reading value source {}", path.display()), e)),
        }
    }
}

impl From<Vec<u8>> for ValueSource {
    fn from(bytes: Vec<u8>) -> Self {
        ValueSource::Bytes(bytes)
    }
}

impl From<&[u8]> for ValueSource {
    fn from(bytes: &[u8]) -> Self {
        ValueSource::Bytes(bytes.to_vec())
    }
}

impl From<&str> for ValueSource {
    fn from(text: &str) -> Self {
        ValueSource::Bytes(text.as_bytes().to_vec())
    }
}

impl From<&Path> for ValueSource {
    fn from(path: &Path) -> Self {
        ValueSource::File(path.to_path_buf())
    }
}

// ============================================================================
// WRITER
// ============================================================================

/// A container with an open phase (Initializing or Transforming).
pub struct ContainerWriter<S: Storage> {
    storage: S,
    crypto: Box<dyn CryptoProvider>,
    identity: SigningIdentity,
    flags: CompatibilityFlags,
    state: LifecycleState,
    history: Vec<Edition>,
    edition: Edition,
    entities: BTreeMap<EntityId, EntityRecord>,
    certificates: BTreeMap<String, Certificate>,
    /// Value content waiting for the seal: (path, bytes)
    pending: Vec<(String, Vec<u8>)>,
    profile_document: Option<Vec<u8>>,
}

impl<S: Storage> ContainerWriter<S> {
    /// Start a new container in `storage` (state → Initializing).
    ///
    /// When a profile is given it is embedded and its name/version are written
    /// into the edition.
    pub fn create(
        storage: S,
        edition: Edition,
        profile: Option<&Profile>,
        identity: SigningIdentity,
        flags: CompatibilityFlags,
    ) -> Result<Self> {
        if storage.exists(MANIFEST_PATH)? {
            return Err(ContainerError::contract("storage already holds a container"));
        }
        check_fresh_edition(&edition)?;

        let mut edition = edition;
        let profile_document = match profile {
            Some(profile) => {
                if edition.profile_name.is_empty() {
                    edition.profile_name = profile.name.clone();
                    edition.profile_version = profile.version.clone();
                } else if edition.profile_name != profile.name {
                    return Err(ContainerError::contract(format!(
                        "edition names profile '{}' but profile '{}' was supplied",
                        edition.profile_name, profile.name
                    )));
                }
                Some(profile.to_json()?)
            }
            None => None,
        };

        info!(edition = %edition.id, profile = %edition.profile_name, "container initialization started");

        Ok(ContainerWriter {
            storage,
            crypto: Box::new(Ed25519Crypto),
            identity,
            flags,
            state: LifecycleState::Initializing,
            history: Vec::new(),
            edition,
            entities: BTreeMap::new(),
            certificates: BTreeMap::new(),
            pending: Vec::new(),
            profile_document,
        })
    }

    /// Open a transformation on top of sealed state. Called by `SealedContainer::start_transformation`.
    pub(crate) fn transforming(
        storage: S,
        crypto: Box<dyn CryptoProvider>,
        flags: CompatibilityFlags,
        history: Vec<Edition>,
        entities: BTreeMap<EntityId, EntityRecord>,
        certificates: BTreeMap<String, Certificate>,
        edition: Edition,
        identity: SigningIdentity,
    ) -> Result<Self> {
        check_fresh_edition(&edition)?;
        if history.iter().any(|e| e.id == edition.id) {
            return Err(ContainerError::contract(format!(
                "edition {} is already part of the container history",
                edition.id
            )));
        }

        let mut edition = edition;
        if edition.profile_name.is_empty() {
            if let Some(current) = history.last() {
                edition.profile_name = current.profile_name.clone();
                edition.profile_version = current.profile_version.clone();
            }
        }

        info!(edition = %edition.id, previous = history.len(), "container transformation started");

        Ok(ContainerWriter {
            storage,
            crypto,
            identity,
            flags,
            state: LifecycleState::Transforming,
            history,
            edition,
            entities,
            certificates,
            pending: Vec::new(),
            profile_document: None,
        })
    }

    /// Replace the crypto provider used for hashing and signing.
    pub fn with_crypto(mut self, crypto: impl CryptoProvider + 'static) -> Self {
        self.crypto = Box::new(crypto);
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn edition(&self) -> &Edition {
        &self.edition
    }

    /// Entities of sealed editions plus those closed in this phase.
    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Smallest id greater than every id used so far (ids start at 1).
    pub fn next_entity_id(&self) -> EntityId {
        self.entities.keys().next_back().map_or(1, |max| max + 1)
    }

    /// Open a new entity. Only one entity can be open at a time.
    pub fn new_entity(
        &mut self,
        id: EntityId,
        entity_type: Option<Guid>,
        provenance: Guid,
        label: Option<&str>,
        predecessors: &[EntityId],
    ) -> Result<EntityBuilder<'_, S>> {
        if id == 0 {
            return Err(ContainerError::contract("entity ids start at 1"));
        }
        if self.entities.contains_key(&id) {
            return Err(ContainerError::contract(format!("entity {} already exists", id)));
        }
        if predecessors.contains(&id) {
            return Err(ContainerError::contract(format!("entity {} cannot derive from itself", id)));
        }

        let mut ordered = Vec::with_capacity(predecessors.len());
        for p in predecessors {
            if !ordered.contains(p) {
                ordered.push(*p);
            }
        }

        Ok(EntityBuilder {
            writer: self,
            id,
            label: label.filter(|l| !l.is_empty()).map(str::to_string),
            entity_type,
            provenance,
            predecessors: ordered,
            values: Vec::new(),
            parameter: None,
        })
    }

    /// Mark an entity of an earlier edition as removed. Its data stays in the container.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<()> {
        if !self.entities.contains_key(&id) {
            return Err(ContainerError::contract(format!("cannot remove unknown entity {}", id)));
        }
        if self.edition.new_entities.contains(&id) {
            return Err(ContainerError::contract(format!(
                "entity {} was introduced in this edition and cannot be removed in it",
                id
            )));
        }
        let already_removed = self
            .history
            .iter()
            .chain(std::iter::once(&self.edition))
            .any(|e| e.removed_entities.contains(&id));
        if already_removed {
            return Err(ContainerError::contract(format!("entity {} is already removed", id)));
        }

        self.edition.removed_entities.push(id);
        debug!(entity = id, edition = %self.edition.id, "entity marked removed");
        Ok(())
    }

    /// Seal the first edition (Initializing → Sealed₁).
    pub fn finish_initialization(self) -> SealResult<S> {
        if self.state != LifecycleState::Initializing {
            return Err(SealFailure::new(
                ContainerError::contract("finish_initialization called outside the initialization phase"),
                self,
            ));
        }
        self.seal()
    }

    /// Seal a follow-up edition with its history link (Transforming → Sealedₙ).
    pub fn finish_transformation(self) -> SealResult<S> {
        if self.state != LifecycleState::Transforming {
            return Err(SealFailure::new(
                ContainerError::contract("finish_transformation called outside a transformation phase"),
                self,
            ));
        }
        self.seal()
    }

    /// Drop the open phase without sealing.
    ///
    /// A transformation falls back to the sealed state it started from. An
    /// initialization has no sealed state and hands its storage back instead.
    pub fn abandon(self) -> std::result::Result<SealedContainer<S>, S> {
        if self.state != LifecycleState::Transforming {
            debug!(edition = %self.edition.id, "initialization abandoned");
            return Err(self.storage);
        }

        let mut entities = self.entities;
        for id in &self.edition.new_entities {
            entities.remove(id);
        }
        info!(edition = %self.edition.id, editions = self.history.len(), "transformation abandoned");

        Ok(SealedContainer::from_parts(
            self.storage,
            self.crypto,
            self.flags,
            self.history,
            entities,
            self.certificates,
        ))
    }

    // ========================================================================
    // SEALING
    // ========================================================================

    fn seal(mut self) -> SealResult<S> {
        let edition = match self.signed_edition() {
            Ok(edition) => edition,
            Err(error) => return Err(SealFailure::new(error, self)),
        };

        let mut written = Vec::new();
        if let Err(error) = self.persist(&edition, &mut written) {
            for path in written.iter().rev() {
                if let Err(cleanup) = self.storage.remove(path) {
                    warn!(path = %path, error = %cleanup, "could not roll back blob of failed seal");
                }
            }
            warn!(edition = %edition.id, error = %error, rolled_back = written.len(), "seal failed");
            return Err(SealFailure::new(error, self));
        }

        info!(
            edition = %edition.id,
            new_entities = edition.new_entities.len(),
            removed_entities = edition.removed_entities.len(),
            editions = self.history.len() + 1,
            "edition sealed"
        );

        let fingerprint = self.identity.certificate().fingerprint();
        let mut certificates = self.certificates;
        certificates.insert(fingerprint, self.identity.certificate().clone());
        let mut editions = self.history;
        editions.push(edition);

        Ok(SealedContainer::from_parts(
            self.storage,
            self.crypto,
            self.flags,
            editions,
            self.entities,
            certificates,
        ))
    }

    /// The open edition with its master signature and history link filled in.
    fn signed_edition(&self) -> Result<Edition> {
        self.check_edition_invariants()?;

        let fingerprint = self.identity.certificate().fingerprint();
        let mut edition = self.edition.clone();

        let covered = self.covered_entities();
        let content = layout::master_content(&edition, &covered)?;
        let canonical = self.crypto.canonicalize(&content)?;
        let digest = self.crypto.hash(&canonical);
        edition.master_signature = Some(SignatureRecord {
            certificate: fingerprint.clone(),
            signature: hex::encode(self.crypto.sign(&digest, &self.identity)?),
        });

        if let Some(previous) = self.history.last() {
            let previous_signature = previous
                .master_signature
                .as_ref()
                .ok_or_else(|| ContainerError::contract(format!("edition {} is not sealed", previous.id)))?;
            let previous_bytes = hex::decode(&previous_signature.signature).map_err(|e| {
                ContainerError::format(format!("master signature of edition {}: {}", previous.id, e))
            })?;
            let link_digest = self.crypto.hash(&previous_bytes);
            edition.history_link = Some(HistoryLink {
                previous_edition: previous.id,
                signature: SignatureRecord {
                    certificate: fingerprint.clone(),
                    signature: hex::encode(self.crypto.sign(&link_digest, &self.identity)?),
                },
            });
        }
        Ok(edition)
    }

    fn check_edition_invariants(&self) -> Result<()> {
        let new: BTreeSet<_> = self.edition.new_entities.iter().collect();
        if let Some(id) = self.edition.removed_entities.iter().find(|id| new.contains(id)) {
            return Err(ContainerError::contract(format!(
                "entity {} is both new and removed in edition {}",
                id, self.edition.id
            )));
        }
        let missing = self
            .edition
            .new_entities
            .iter()
            .chain(self.edition.removed_entities.iter())
            .find(|id| !self.entities.contains_key(*id));
        if let Some(id) = missing {
            return Err(ContainerError::contract(format!(
                "edition {} references unknown entity {}",
                self.edition.id, id
            )));
        }
        Ok(())
    }

    /// Entities introduced by all editions up to the open one, ordered by id.
    fn covered_entities(&self) -> Vec<&EntityRecord> {
        let ids: BTreeSet<EntityId> = self
            .history
            .iter()
            .chain(std::iter::once(&self.edition))
            .flat_map(|e| e.new_entities.iter().copied())
            .collect();
        ids.iter().filter_map(|id| self.entities.get(id)).collect()
    }

    /// Write every blob of this edition, manifest last. Paths written (except
    /// the manifest) are recorded so a failure can roll them back.
    fn persist(&mut self, edition: &Edition, written: &mut Vec<String>) -> Result<()> {
        let certificate = self.identity.certificate();
        let cert_path = layout::certificate_path(&certificate.fingerprint());
        if !self.storage.exists(&cert_path)? {
            self.storage.write(&cert_path, &certificate.to_json()?)?;
            written.push(cert_path);
        }

        if let Some(document) = &self.profile_document {
            self.storage.write(PROFILE_PATH, document)?;
            written.push(PROFILE_PATH.to_string());
        }

        for (path, content) in &self.pending {
            self.storage.write(path, content)?;
            written.push(path.clone());
        }

        for id in &edition.new_entities {
            let record = self
                .entities
                .get(id)
                .ok_or_else(|| ContainerError::contract(format!("unknown entity {}", id)))?;
            let path = layout::entity_path(*id);
            self.storage.write(&path, &layout::to_json(record, "entity record")?)?;
            written.push(path);
        }

        let edition_path = layout::edition_path(&edition.id);
        self.storage
            .write(&edition_path, &layout::to_json(edition, "edition record")?)?;
        written.push(edition_path);

        let manifest = Manifest {
            format: FORMAT_REVISION,
            editions: self
                .history
                .iter()
                .map(|e| e.id)
                .chain(std::iter::once(edition.id))
                .collect(),
        };
        self.storage
            .write(MANIFEST_PATH, &layout::to_json(&manifest, "manifest")?)
    }

    /// Digest and sign one value. Returns the record and the blob to persist, if any.
    fn sign_value(&self, path: String, value: PendingValue) -> Result<(ValueRecord, Option<(String, Vec<u8>)>)> {
        let salt = match self.edition.salt_state {
            SaltState::Unsalted => None,
            SaltState::PerValue => Some(rand::random::<[u8; SALT_LEN]>().to_vec()),
        };

        let mut salted = salt.clone().unwrap_or_default();
        salted.extend_from_slice(&value.content);
        let digest = self.crypto.hash(&salted);
        let signature = self.crypto.sign(&digest, &self.identity)?;

        let (content_path, blob) = match value.appearance {
            Appearance::Plain => (Some(path.clone()), Some((path, value.content.clone()))),
            Appearance::Suppressed => (None, None),
        };

        let record = ValueRecord {
            name: value.name,
            data_type: value.data_type,
            appearance: value.appearance,
            size: value.content.len() as u64,
            salt: salt.map(hex::encode),
            digest: hex::encode(digest),
            signature: SignatureRecord {
                certificate: self.identity.certificate().fingerprint(),
                signature: hex::encode(signature),
            },
            content_path,
        };
        Ok((record, blob))
    }
}

// ============================================================================
// SEAL FAILURE
// ============================================================================

pub type SealResult<S> = std::result::Result<SealedContainer<S>, SealFailure<S>>;

/// A seal that did not commit. Blobs of the attempt are already rolled back and
/// the writer is returned with its open phase intact.
pub struct SealFailure<S: Storage> {
    error: ContainerError,
    writer: ContainerWriter<S>,
}

impl<S: Storage> SealFailure<S> {
    fn new(error: ContainerError, writer: ContainerWriter<S>) -> Self {
        SealFailure { error, writer }
    }

    pub fn error(&self) -> &ContainerError {
        &self.error
    }

    pub fn into_error(self) -> ContainerError {
        self.error
    }

    /// The writer, still Initializing or Transforming. Sealing may be retried.
    pub fn into_writer(self) -> ContainerWriter<S> {
        self.writer
    }
}

impl<S: Storage> fmt::Debug for SealFailure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealFailure")
            .field("error", &self.error)
            .field("state", &self.writer.state)
            .field("edition", &self.writer.edition.id)
            .finish()
    }
}

impl<S: Storage> fmt::Display for SealFailure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seal of edition {} failed: {}", self.writer.edition.id, self.error)
    }
}

impl<S: Storage> std::error::Error for SealFailure<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<S: Storage> From<SealFailure<S>> for ContainerError {
    fn from(failure: SealFailure<S>) -> Self {
        failure.error
    }
}

/// Reject editions that already carry sealed state.
fn check_fresh_edition(edition: &Edition) -> Result<()> {
    if edition.software.trim().is_empty() {
        return Err(ContainerError::contract("edition software name is empty"));
    }
    if edition.is_sealed() || edition.history_link.is_some() {
        return Err(ContainerError::contract(format!("edition {} is already sealed", edition.id)));
    }
    if !edition.new_entities.is_empty() || !edition.removed_entities.is_empty() {
        return Err(ContainerError::contract(format!(
            "edition {} must start without entity markers",
            edition.id
        )));
    }
    Ok(())
}

// ============================================================================
// ENTITY BUILDER
// ============================================================================

struct PendingValue {
    name: String,
    data_type: Option<Guid>,
    appearance: Appearance,
    content: Vec<u8>,
}

/// An open entity. Values can only be added until `close`, which consumes it.
///
/// Dropping the builder without closing discards the entity.
pub struct EntityBuilder<'w, S: Storage> {
    writer: &'w mut ContainerWriter<S>,
    id: EntityId,
    label: Option<String>,
    entity_type: Option<Guid>,
    provenance: Guid,
    predecessors: Vec<EntityId>,
    values: Vec<PendingValue>,
    parameter: Option<PendingValue>,
}

impl<S: Storage> EntityBuilder<'_, S> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Attach a named value. Names are unique within the entity.
    pub fn add_value(
        &mut self,
        name: &str,
        data_type: Option<Guid>,
        appearance: Appearance,
        source: impl Into<ValueSource>,
    ) -> Result<&mut Self> {
        if name.trim().is_empty() {
            return Err(ContainerError::contract("value name is empty"));
        }
        if self.values.iter().any(|v| v.name == name) {
            return Err(ContainerError::contract(format!(
                "entity {} already has a value named '{}'",
                self.id, name
            )));
        }

        let content = source.into().into_bytes()?;
        self.values.push(PendingValue {
            name: name.to_string(),
            data_type,
            appearance,
            content,
        });
        Ok(self)
    }

    /// Attach the provenance parameter value (e.g. the command line of the producing tool).
    pub fn set_provenance_parameter(
        &mut self,
        name: &str,
        data_type: Option<Guid>,
        appearance: Appearance,
        source: impl Into<ValueSource>,
    ) -> Result<&mut Self> {
        if name.trim().is_empty() {
            return Err(ContainerError::contract("provenance parameter name is empty"));
        }
        if self.parameter.is_some() {
            return Err(ContainerError::contract(format!(
                "entity {} already has a provenance parameter",
                self.id
            )));
        }

        let content = source.into().into_bytes()?;
        self.parameter = Some(PendingValue {
            name: name.to_string(),
            data_type,
            appearance,
            content,
        });
        Ok(self)
    }

    /// Sign the values and append the entity to the open edition.
    pub fn close(self) -> Result<EntityId> {
        let EntityBuilder {
            writer,
            id,
            label,
            entity_type,
            provenance,
            predecessors,
            values,
            parameter,
        } = self;

        if let Some(missing) = predecessors.iter().find(|p| !writer.entities.contains_key(*p)) {
            return Err(ContainerError::contract(format!(
                "predecessor {} of entity {} does not exist",
                missing, id
            )));
        }

        let mut blobs = Vec::new();
        let mut records = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let (record, blob) = writer.sign_value(layout::value_path(id, index), value)?;
            records.push(record);
            blobs.extend(blob);
        }

        let parameter = match parameter {
            Some(value) => {
                let (record, blob) = writer.sign_value(layout::parameter_path(id), value)?;
                blobs.extend(blob);
                Some(record)
            }
            None => None,
        };

        let record = EntityRecord {
            id,
            label,
            entity_type,
            provenance: ProvenanceRecord {
                interface: provenance,
                parameter,
            },
            predecessors,
            values: records,
        };

        debug!(entity = id, values = record.values.len(), "entity closed");
        writer.pending.extend(blobs);
        writer.entities.insert(id, record);
        writer.edition.new_entities.push(id);
        Ok(id)
    }
}
