// 📜 Certificates & signing identities
//
// A certificate binds a subject to an Ed25519 public key and is signed by its
// issuer (itself, when self-signed). Identities pair the private key with it.

use super::{canonical_json, sha256};
use crate::error::{ContainerError, OperationContext, Result};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default validity for freshly issued certificates
const DEFAULT_VALIDITY_DAYS: i64 = 5 * 365;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub subject: String,
    pub issuer: String,
    /// Hex-encoded Ed25519 public key
    pub public_key: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Hex-encoded issuer signature over the certificate body
    pub issuer_signature: String,
}

impl Certificate {
    /// Hex SHA-256 of the public key bytes; names the certificate inside a container.
    pub fn fingerprint(&self) -> String {
        let key = hex::decode(&self.public_key).unwrap_or_else(|_| self.public_key.as_bytes().to_vec());
        hex::encode(sha256(&key))
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let bytes = hex::decode(&self.public_key)
            .map_err(|e| ContainerError::format(format!("certificate '{}' public key: {}", self.subject, e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            ContainerError::format(format!("certificate '{}' public key has wrong length", self.subject))
        })?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| ContainerError::format(format!("certificate '{}' public key: {}", self.subject, e)))
    }

    /// Canonical bytes covered by the issuer signature.
    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        canonical_json(&serde_json::json!({
            "subject": self.subject,
            "issuer": self.issuer,
            "public_key": self.public_key,
            "not_before": self.not_before.to_rfc3339(),
            "not_after": self.not_after.to_rfc3339(),
        }))
    }

    /// Check the issuer signature against the issuer's public key.
    pub fn is_signed_by(&self, issuer: &Certificate) -> bool {
        if self.issuer != issuer.subject {
            return false;
        }
        let (Ok(key), Ok(body), Ok(sig)) = (
            issuer.verifying_key(),
            self.body_bytes(),
            hex::decode(&self.issuer_signature),
        ) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&sig) else {
            return false;
        };
        key.verify(&body, &signature).is_ok()
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer && self.is_signed_by(self)
    }

    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        self.not_before <= time && time <= self.not_after
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ContainerError::format(format!("certificate document: {}", e)))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).op_context(|| "serializing certificate".to_string())
    }
}

// ============================================================================
// SIGNING IDENTITY
// ============================================================================

/// Private key plus the certificate that publishes its public half.
pub struct SigningIdentity {
    signing_key: SigningKey,
    certificate: Certificate,
}

#[derive(Serialize, Deserialize)]
struct IdentityFile {
    private_key: String,
    certificate: Certificate,
}

impl SigningIdentity {
    /// Fresh key with a certificate issued by itself.
    pub fn self_signed(subject: &str) -> Result<Self> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let certificate = issue(&signing_key, subject, subject, &signing_key)?;
        Ok(SigningIdentity { signing_key, certificate })
    }

    /// Fresh key with a certificate issued by `ca`.
    pub fn issued_by(ca: &SigningIdentity, subject: &str) -> Result<Self> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let certificate = issue(&signing_key, subject, &ca.certificate.subject, &ca.signing_key)?;
        Ok(SigningIdentity { signing_key, certificate })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = IdentityFile {
            private_key: hex::encode(self.signing_key.to_bytes()),
            certificate: self.certificate.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file).op_context(|| "serializing identity".to_string())?;
        std::fs::write(path, bytes).op_context(|| format!("writing identity {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).op_context(|| format!("reading identity {}", path.display()))?;
        let file: IdentityFile = serde_json::from_slice(&bytes)
            .map_err(|e| ContainerError::format(format!("identity {}: {}", path.display(), e)))?;

        let secret = hex::decode(&file.private_key)
            .map_err(|e| ContainerError::format(format!("identity private key: {}", e)))?;
        let secret: [u8; 32] = secret
            .try_into()
            .map_err(|_| ContainerError::format("identity private key has wrong length"))?;
        let signing_key = SigningKey::from_bytes(&secret);

        if hex::encode(signing_key.verifying_key().to_bytes()) != file.certificate.public_key {
            return Err(ContainerError::format(
                "identity private key does not match its certificate",
            ));
        }

        Ok(SigningIdentity {
            signing_key,
            certificate: file.certificate,
        })
    }
}

fn issue(subject_key: &SigningKey, subject: &str, issuer: &str, issuer_key: &SigningKey) -> Result<Certificate> {
    if subject.trim().is_empty() {
        return Err(ContainerError::contract("certificate subject is empty"));
    }

    let now = Utc::now();
    let mut certificate = Certificate {
        subject: subject.to_string(),
        issuer: issuer.to_string(),
        public_key: hex::encode(subject_key.verifying_key().to_bytes()),
        not_before: now - Duration::minutes(5),
        not_after: now + Duration::days(DEFAULT_VALIDITY_DAYS),
        issuer_signature: String::new(),
    };
    let signature: Signature = issuer_key.sign(&certificate.body_bytes()?);
    certificate.issuer_signature = hex::encode(signature.to_bytes());
    Ok(certificate)
}
