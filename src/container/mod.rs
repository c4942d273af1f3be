// 📦 Container Lifecycle
// Uninitialized → Initializing → Sealed₁ → Transforming → Sealed₂ → … → Sealedₙ
//
// `ContainerWriter` is the only type that can add entities; it turns into a
// `SealedContainer` only when a seal fully commits. A sealed container is
// read-only and can start the next transformation by value.

pub mod layout;
pub mod lifecycle;
pub mod model;
mod reader;
pub mod sealed;
mod verify;

pub use lifecycle::{ContainerWriter, EntityBuilder, LifecycleState, SealFailure, SealResult, ValueSource};
pub use model::{
    Appearance, Edition, EntityId, EntityRecord, HistoryLink, Owner, ProvenanceRecord, SaltState,
    SignatureRecord, ValueRecord, UNLABELED,
};
pub use sealed::SealedContainer;

use serde::{Deserialize, Serialize};

/// Tolerances applied when writing and reading persisted containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityFlags {
    /// Open manifests written with an older layout revision
    #[serde(default)]
    pub accept_legacy_format: bool,
    /// Report storage entries the layout does not reference
    #[serde(default)]
    pub report_unreferenced_entries: bool,
}
