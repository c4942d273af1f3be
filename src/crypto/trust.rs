// 🛡️ Certificate trust evaluation
// Chains a signer certificate to a CA directory, or accepts it as self-signed
// when the rules allow it.

use super::Certificate;
use crate::error::{OperationContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRules {
    #[serde(default)]
    pub allow_self_signed_certificate: bool,
}

/// Trusted CA certificates, keyed by fingerprint.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    certificates: HashMap<String, Certificate>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` certificate found directly in `dir`.
    ///
    /// Files that do not parse as certificates are skipped with a warning.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let mut store = TrustStore::new();
        let entries = std::fs::read_dir(dir).op_context(|| format!("reading CA directory {}", dir.display()))?;

        for entry in entries {
            let path = entry
                .op_context(|| format!("reading CA directory {}", dir.display()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path).op_context(|| format!("reading {}", path.display()))?;
            match Certificate::from_json(&bytes) {
                Ok(cert) => store.add(cert),
                Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable CA certificate"),
            }
        }

        debug!(count = store.len(), dir = %dir.display(), "loaded CA certificates");
        Ok(store)
    }

    pub fn add(&mut self, certificate: Certificate) {
        self.certificates.insert(certificate.fingerprint(), certificate);
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Decide whether `certificate` is trusted at `at`.
    ///
    /// Returns a short description of the trust path, or the reason it was rejected.
    pub fn evaluate(
        &self,
        certificate: &Certificate,
        rules: &CertificateRules,
        at: DateTime<Utc>,
    ) -> std::result::Result<String, String> {
        if !certificate.is_valid_at(at) {
            return Err(format!(
                "certificate '{}' is not valid at {} (valid {} to {})",
                certificate.subject,
                at.to_rfc3339(),
                certificate.not_before.to_rfc3339(),
                certificate.not_after.to_rfc3339()
            ));
        }

        if let Some(trusted) = self.certificates.get(&certificate.fingerprint()) {
            if trusted == certificate {
                return Ok(format!("certificate '{}' is a trusted CA", certificate.subject));
            }
        }

        if let Some(ca) = self
            .certificates
            .values()
            .find(|ca| certificate.is_signed_by(ca))
        {
            if !ca.is_valid_at(at) {
                return Err(format!(
                    "issuer '{}' of certificate '{}' is not valid at {}",
                    ca.subject,
                    certificate.subject,
                    at.to_rfc3339()
                ));
            }
            return Ok(format!(
                "certificate '{}' chains to trusted CA '{}'",
                certificate.subject, ca.subject
            ));
        }

        if certificate.is_self_signed() {
            if rules.allow_self_signed_certificate {
                return Ok(format!(
                    "certificate '{}' is self-signed (allowed by rules)",
                    certificate.subject
                ));
            }
            return Err(format!(
                "certificate '{}' is self-signed and self-signed certificates are not allowed",
                certificate.subject
            ));
        }

        Err(format!(
            "certificate '{}' issued by '{}' does not chain to a trusted CA",
            certificate.subject, certificate.issuer
        ))
    }
}
