// 🔐 Crypto Port
// Hashing, signing, verification and canonicalization behind one trait.
// The shipped provider is SHA-256 + Ed25519 + key-sorted compact JSON.

pub mod certificate;
pub mod trust;

pub use certificate::{Certificate, SigningIdentity};
pub use trust::{CertificateRules, TrustStore};

use crate::error::{ContainerError, OperationContext, Result};
use ed25519_dalek::{Signature, Signer, Verifier};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};

pub trait CryptoProvider: Send + Sync {
    /// Content digest.
    fn hash(&self, bytes: &[u8]) -> Vec<u8>;

    /// Sign a digest with the identity's private key.
    fn sign(&self, digest: &[u8], identity: &SigningIdentity) -> Result<Vec<u8>>;

    /// Check a signature over a digest against a certificate's public key.
    fn verify(&self, digest: &[u8], signature: &[u8], certificate: &Certificate) -> bool;

    /// Deterministic byte form of structured content, hashed before signing.
    fn canonicalize(&self, content: &JsonValue) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Crypto;

impl CryptoProvider for Ed25519Crypto {
    fn hash(&self, bytes: &[u8]) -> Vec<u8> {
        sha256(bytes)
    }

    fn sign(&self, digest: &[u8], identity: &SigningIdentity) -> Result<Vec<u8>> {
        if digest.is_empty() {
            return Err(ContainerError::contract("cannot sign an empty digest"));
        }
        let signature: Signature = identity.signing_key().sign(digest);
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, digest: &[u8], signature: &[u8], certificate: &Certificate) -> bool {
        let Ok(key) = certificate.verifying_key() else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(digest, &signature).is_ok()
    }

    fn canonicalize(&self, content: &JsonValue) -> Result<Vec<u8>> {
        canonical_json(content)
    }
}

pub fn sha256(bytes: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().to_vec()
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(content: &JsonValue) -> Result<Vec<u8>> {
    serde_json::to_vec(&sorted(content)).op_context(|| "canonicalizing content".to_string())
}

fn sorted(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_ignores_key_order() {
        let a = json!({"b": 1, "a": {"z": true, "y": [3, 2]}});
        let b = json!({"a": {"y": [3, 2], "z": true}, "b": 1});

        let ca = canonical_json(&a).unwrap();
        assert_eq!(ca, canonical_json(&b).unwrap());
        assert_eq!(String::from_utf8(ca).unwrap(), r#"{"a":{"y":[3,2],"z":true},"b":1}"#);
    }

    #[test]
    fn test_sign_then_verify() {
        let crypto = Ed25519Crypto;
        let identity = SigningIdentity::self_signed("examiner").unwrap();
        let digest = crypto.hash(b"disk image");

        let signature = crypto.sign(&digest, &identity).unwrap();
        assert!(crypto.verify(&digest, &signature, identity.certificate()));

        let other = crypto.hash(b"tampered image");
        assert!(!crypto.verify(&other, &signature, identity.certificate()));
    }

    #[test]
    fn test_verify_rejects_foreign_certificate() {
        let crypto = Ed25519Crypto;
        let signer = SigningIdentity::self_signed("a").unwrap();
        let stranger = SigningIdentity::self_signed("b").unwrap();
        let digest = crypto.hash(b"x");

        let signature = crypto.sign(&digest, &signer).unwrap();
        assert!(!crypto.verify(&digest, &signature, stranger.certificate()));
        assert!(!crypto.verify(&digest, b"short", signer.certificate()));
    }

    #[test]
    fn test_sha256_length() {
        assert_eq!(hex::encode(sha256(b"abc")).len(), 64);
    }
}
