// ✅ Signature & certificate verification
// Read-only passes over a sealed container. Findings go to the sink; the
// returned bool is the verdict of the pass.

use super::model::{Appearance, EntityRecord, SignatureRecord, ValueRecord};
use super::sealed::SealedContainer;
use crate::crypto::{Certificate, CertificateRules, TrustStore};
use crate::error::Result;
use crate::storage::Storage;
use crate::validation::{MessageSink, Tally, Topic, ValidationMessage};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

impl<S: Storage> SealedContainer<S> {
    /// Re-hash every persisted value and check size, digest and signature.
    ///
    /// Suppressed values cannot be re-hashed; their signature over the recorded
    /// digest is checked instead.
    pub fn verify_entity_value_signatures(&self, handler: &mut dyn MessageSink) -> bool {
        let mut sink = Tally::new(handler);

        for entity in self.entities.values() {
            let before = sink.errors();
            let mut suppressed = 0;
            for value in entity.all_values() {
                if let Err(problem) = self.check_value(value) {
                    sink.push(ValidationMessage::error(
                        Topic::Value,
                        format!(
                            "Entity {} '{}' value '{}': {}",
                            entity.id,
                            entity.label_or_placeholder(),
                            value.name,
                            problem
                        ),
                    ));
                } else if value.appearance == Appearance::Suppressed {
                    suppressed += 1;
                }
            }

            if sink.errors() == before {
                let total = entity.all_values().count();
                let text = if suppressed > 0 {
                    format!(
                        "Entity {} '{}': {} value signature(s) verified, {} suppressed value(s) checked against recorded digest",
                        entity.id,
                        entity.label_or_placeholder(),
                        total,
                        suppressed
                    )
                } else {
                    format!(
                        "Entity {} '{}': {} value signature(s) verified",
                        entity.id,
                        entity.label_or_placeholder(),
                        total
                    )
                };
                sink.push(ValidationMessage::success(Topic::Value, text));
            }
        }

        debug!(entities = self.entities.len(), errors = sink.errors(), "value signatures verified");
        sink.passed()
    }

    fn check_value(&self, value: &ValueRecord) -> std::result::Result<(), String> {
        let digest = hex::decode(&value.digest).map_err(|e| format!("malformed digest ({})", e))?;

        if value.appearance == Appearance::Plain {
            let content = self
                .read_content(value)
                .map_err(|e| format!("content unreadable ({})", e))?;
            if content.len() as u64 != value.size {
                return Err(format!("size {} differs from recorded size {}", content.len(), value.size));
            }

            let mut salted = match &value.salt {
                Some(salt) => hex::decode(salt).map_err(|e| format!("malformed salt ({})", e))?,
                None => Vec::new(),
            };
            salted.extend_from_slice(&content);
            if self.crypto.hash(&salted) != digest {
                return Err("content does not match its digest".to_string());
            }
        }

        self.check_signature(&value.signature, &digest)
    }

    /// Verify a signature record over a digest against the certificate it names.
    fn check_signature(&self, record: &SignatureRecord, digest: &[u8]) -> std::result::Result<(), String> {
        let certificate = self
            .certificates
            .get(&record.certificate)
            .ok_or_else(|| format!("signer certificate {} is missing", record.certificate))?;
        let signature = hex::decode(&record.signature).map_err(|e| format!("malformed signature ({})", e))?;
        if !self.crypto.verify(digest, &signature, certificate) {
            return Err(format!("signature does not verify against '{}'", certificate.subject));
        }
        Ok(())
    }

    /// Check that every signer certificate is trusted and that every master
    /// signature, history link and value signature verifies.
    ///
    /// Certificates are evaluated at the timestamp of the edition that used them.
    pub fn validate_certificates(
        &self,
        ca_directory: Option<&Path>,
        rules: &CertificateRules,
        handler: &mut dyn MessageSink,
    ) -> Result<bool> {
        let store = match ca_directory {
            Some(dir) => TrustStore::from_directory(dir)?,
            None => TrustStore::new(),
        };
        let mut sink = Tally::new(handler);

        // Trust
        let mut evaluated = BTreeSet::new();
        for (index, edition) in self.editions.iter().enumerate() {
            for fingerprint in self.signers_of(index) {
                if !evaluated.insert((fingerprint.clone(), index)) {
                    continue;
                }
                match self.certificates.get(&fingerprint) {
                    Some(cert) => self.evaluate_trust(&store, cert, rules, edition.timestamp, &mut sink),
                    None => sink.push(ValidationMessage::error(
                        Topic::Certificate,
                        format!("certificate {} used in edition {} is missing", fingerprint, edition.id),
                    )),
                }
            }
        }

        // Master signatures and history links
        for (index, edition) in self.editions.iter().enumerate() {
            match &edition.master_signature {
                Some(record) => {
                    let content = self.master_content(index)?;
                    let digest = self.crypto.hash(&self.crypto.canonicalize(&content)?);
                    self.report_signature(
                        &mut sink,
                        record,
                        &digest,
                        format!("master signature of edition {}", edition.id),
                    );
                }
                None => sink.push(ValidationMessage::error(
                    Topic::Certificate,
                    format!("edition {} carries no master signature", edition.id),
                )),
            }

            if index == 0 {
                continue;
            }
            let previous = &self.editions[index - 1];
            match (&edition.history_link, &previous.master_signature) {
                (Some(link), Some(previous_signature)) => {
                    match hex::decode(&previous_signature.signature) {
                        Ok(bytes) => {
                            let digest = self.crypto.hash(&bytes);
                            self.report_signature(
                                &mut sink,
                                &link.signature,
                                &digest,
                                format!("history link of edition {}", edition.id),
                            );
                        }
                        Err(e) => sink.push(ValidationMessage::error(
                            Topic::Certificate,
                            format!("master signature of edition {} is malformed: {}", previous.id, e),
                        )),
                    }
                }
                _ => sink.push(ValidationMessage::error(
                    Topic::Certificate,
                    format!("history link of edition {} cannot be verified", edition.id),
                )),
            }
        }

        // Value signatures over their recorded digests
        for entity in self.entities.values() {
            if let Err(problem) = self.check_entity_signatures(entity) {
                sink.push(ValidationMessage::error(Topic::Certificate, problem));
            }
        }

        debug!(
            editions = self.editions.len(),
            trusted_cas = store.len(),
            errors = sink.errors(),
            "certificates validated"
        );
        Ok(sink.passed())
    }

    fn evaluate_trust(
        &self,
        store: &TrustStore,
        certificate: &Certificate,
        rules: &CertificateRules,
        at: DateTime<Utc>,
        sink: &mut dyn MessageSink,
    ) {
        match store.evaluate(certificate, rules, at) {
            Ok(path) => sink.push(ValidationMessage::success(Topic::Certificate, path)),
            Err(reason) => sink.push(ValidationMessage::error(Topic::Certificate, reason)),
        }
    }

    fn report_signature(&self, sink: &mut dyn MessageSink, record: &SignatureRecord, digest: &[u8], what: String) {
        match self.check_signature(record, digest) {
            Ok(()) => sink.push(ValidationMessage::success(Topic::Certificate, format!("{} verified", what))),
            Err(problem) => sink.push(ValidationMessage::error(Topic::Certificate, format!("{}: {}", what, problem))),
        }
    }

    fn check_entity_signatures(&self, entity: &EntityRecord) -> std::result::Result<(), String> {
        for value in entity.all_values() {
            let digest = hex::decode(&value.digest)
                .map_err(|e| format!("entity {} value '{}': malformed digest ({})", entity.id, value.name, e))?;
            self.check_signature(&value.signature, &digest)
                .map_err(|problem| format!("entity {} value '{}': {}", entity.id, value.name, problem))?;
        }
        Ok(())
    }

    /// Fingerprints of every certificate that signed something in edition `index`.
    fn signers_of(&self, index: usize) -> BTreeSet<String> {
        let edition = &self.editions[index];
        let mut signers: BTreeSet<String> = edition
            .master_signature
            .iter()
            .chain(edition.history_link.iter().map(|l| &l.signature))
            .map(|s| s.certificate.clone())
            .collect();
        for id in &edition.new_entities {
            if let Some(entity) = self.entities.get(id) {
                signers.extend(entity.all_values().map(|v| v.signature.certificate.clone()));
            }
        }
        signers
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::Guid;
    use crate::container::{Appearance, CompatibilityFlags, ContainerWriter, Edition, Owner, SaltState, SealedContainer};
    use crate::crypto::{CertificateRules, SigningIdentity};
    use crate::storage::{ArchiveStorage, Storage};
    use crate::validation::{Topic, ValidationMessage};

    fn sealed(salt: SaltState) -> SealedContainer<ArchiveStorage> {
        let edition = Edition::new("acquire 1.0", Owner::new("Lab", "Ann", "ann@lab.example")).with_salt_state(salt);
        let mut writer = ContainerWriter::create(
            ArchiveStorage::in_memory().unwrap(),
            edition,
            None,
            SigningIdentity::self_signed("Ann").unwrap(),
            CompatibilityFlags::default(),
        )
        .unwrap();
        let mut entity = writer.new_entity(1, None, Guid::new_v4(), Some("disk"), &[]).unwrap();
        entity
            .add_value("image", None, Appearance::Plain, "raw sectors")
            .unwrap()
            .add_value("owner", None, Appearance::Suppressed, "Jane Doe")
            .unwrap();
        entity.close().unwrap();
        writer.finish_initialization().unwrap()
    }

    #[test]
    fn test_value_signatures_verify() {
        for salt in [SaltState::Unsalted, SaltState::PerValue] {
            let container = sealed(salt);
            let mut messages: Vec<ValidationMessage> = Vec::new();
            assert!(container.verify_entity_value_signatures(&mut messages));
            assert_eq!(messages.len(), 1);
            assert!(messages[0].text.contains("1 suppressed"));
        }
    }

    #[test]
    fn test_tampered_content_is_reported() {
        let container = sealed(SaltState::PerValue);
        let mut storage = container.into_storage();
        storage.write("values/1/0.bin", b"raw sectorz").unwrap();

        let mut messages: Vec<ValidationMessage> = Vec::new();
        let reopened = SealedContainer::open(storage, &mut messages, CompatibilityFlags::default()).unwrap();
        messages.clear();

        assert!(!reopened.verify_entity_value_signatures(&mut messages));
        let errors: Vec<_> = messages.iter().filter(|m| m.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].topic, Topic::Value);
        assert!(errors[0].text.contains("digest"));
    }

    #[test]
    fn test_self_signed_rules() {
        let container = sealed(SaltState::Unsalted);

        let mut allowed: Vec<ValidationMessage> = Vec::new();
        let rules = CertificateRules {
            allow_self_signed_certificate: true,
        };
        assert!(container.validate_certificates(None, &rules, &mut allowed).unwrap());
        assert!(allowed.iter().any(|m| m.text.contains("master signature")));

        let mut rejected: Vec<ValidationMessage> = Vec::new();
        assert!(!container
            .validate_certificates(None, &CertificateRules::default(), &mut rejected)
            .unwrap());
        assert!(rejected.iter().any(|m| m.is_error() && m.topic == Topic::Certificate));
    }

    #[test]
    fn test_ca_issued_identity_is_trusted() {
        let ca = SigningIdentity::self_signed("Lab CA").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ca.json"), ca.certificate().to_json().unwrap()).unwrap();

        let mut writer = ContainerWriter::create(
            ArchiveStorage::in_memory().unwrap(),
            Edition::new("acquire 1.0", Owner::new("Lab", "Ann", "ann@lab.example")),
            None,
            SigningIdentity::issued_by(&ca, "Ann").unwrap(),
            CompatibilityFlags::default(),
        )
        .unwrap();
        writer.new_entity(1, None, Guid::new_v4(), None, &[]).unwrap().close().unwrap();
        let container = writer.finish_initialization().unwrap();

        let mut messages: Vec<ValidationMessage> = Vec::new();
        assert!(container
            .validate_certificates(Some(dir.path()), &CertificateRules::default(), &mut messages)
            .unwrap());
        assert!(messages.iter().any(|m| m.text.contains("chains to trusted CA 'Lab CA'")));
    }
}
