// ⚙️ Validation run configuration
// JSON file, then environment overrides, then CLI flags (applied by the binary).

use crate::container::CompatibilityFlags;
use crate::crypto::CertificateRules;
use crate::error::{ContainerError, OperationContext, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory of trusted CA certificates
pub const ENV_CA_DIR: &str = "EVIDENCE_CA_DIR";
/// `true`/`false` (also `1`/`0`, `yes`/`no`)
pub const ENV_ALLOW_SELF_SIGNED: &str = "EVIDENCE_ALLOW_SELF_SIGNED";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub ca_directory: Option<PathBuf>,
    #[serde(default)]
    pub rules: CertificateRules,
    #[serde(default)]
    pub compatibility: CompatibilityFlags,
}

impl ValidationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).op_context(|| format!("reading config {}", path.display()))?;
        let config: ValidationConfig = serde_json::from_slice(&bytes)
            .map_err(|e| ContainerError::format(format!("config {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "validation config loaded");
        Ok(config)
    }

    /// Apply `EVIDENCE_CA_DIR` and `EVIDENCE_ALLOW_SELF_SIGNED` from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup(ENV_CA_DIR).filter(|d| !d.is_empty()) {
            self.ca_directory = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup(ENV_ALLOW_SELF_SIGNED) {
            self.rules.allow_self_signed_certificate = parse_flag(&flag).ok_or_else(|| {
                ContainerError::format(format!("{} must be true or false, got '{}'", ENV_ALLOW_SELF_SIGNED, flag))
            })?;
        }
        Ok(self)
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
