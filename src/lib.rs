// Evidence Container - Core Library
// Signed, append-only evidence containers: storage, crypto, lifecycle, profile validation and reports.

pub mod error;
pub mod storage;        // Storage Port: directory + archive backends
pub mod crypto;         // Crypto Port: SHA-256, Ed25519, certificates, trust
pub mod validation;     // ValidationMessage + sinks
pub mod catalog;        // DataType / EntityType / ProvenanceInterface catalogs
pub mod profile;        // Profile document + ProfileValidator
pub mod container;      // Two-phase lifecycle, layout, open, verification
pub mod report;         // Four-collection report aggregator
pub mod config;         // Validation run configuration

// Re-export commonly used types
pub use error::{ContainerError, Result};
pub use storage::{open_storage, validate_path, ArchiveStorage, DirectoryStorage, Storage};
pub use crypto::{
    Certificate, CertificateRules, CryptoProvider, Ed25519Crypto, SigningIdentity, TrustStore,
};
pub use validation::{
    MessageSink, Severity, SharedCollection, Tally, Topic, ValidationMessage, ValidationMessageCollection,
};
pub use catalog::{
    Catalog, CatalogItem, DataType, EntityType, Guid, ParameterDescriptor, ProvenanceInterface,
    TypeSeverity, Usage, ValueDescriptor,
};
pub use profile::{Profile, ProfileValidator};
pub use container::{
    Appearance, CompatibilityFlags, ContainerWriter, Edition, EntityBuilder, EntityId, EntityRecord,
    LifecycleState, Owner, SaltState, SealFailure, SealResult, SealedContainer, ValueRecord, ValueSource,
};
pub use report::{container_snapshot, Concern, ValidationReport};
pub use config::ValidationConfig;

/// Software name written into editions created by this crate's tools
pub const SOFTWARE: &str = concat!("evidence-container ", env!("CARGO_PKG_VERSION"));
