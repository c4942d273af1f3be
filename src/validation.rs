// ✅ Validation messages
// Findings are data, not errors: every validation pass pushes ValidationMessage
// values into a sink passed explicitly by the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// MESSAGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Success,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Structure,
    Value,
    Certificate,
    Profile,
    Entity,
    ContainerProfile,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Structure => "Structure",
            Topic::Value => "Value",
            Topic::Certificate => "Certificate",
            Topic::Profile => "Profile",
            Topic::Entity => "Entity",
            Topic::ContainerProfile => "ContainerProfile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub topic: Topic,
    pub text: String,
}

impl ValidationMessage {
    pub fn success(topic: Topic, text: impl Into<String>) -> Self {
        ValidationMessage {
            severity: Severity::Success,
            topic,
            text: text.into(),
        }
    }

    pub fn error(topic: Topic, text: impl Into<String>) -> Self {
        ValidationMessage {
            severity: Severity::Error,
            topic,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.severity.as_str(), self.topic.as_str(), self.text)
    }
}

// ============================================================================
// SINKS
// ============================================================================

/// Receiver for validation findings.
pub trait MessageSink {
    fn push(&mut self, message: ValidationMessage);
}

impl MessageSink for Vec<ValidationMessage> {
    fn push(&mut self, message: ValidationMessage) {
        Vec::push(self, message);
    }
}

impl<S: MessageSink + ?Sized> MessageSink for &mut S {
    fn push(&mut self, message: ValidationMessage) {
        (**self).push(message);
    }
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn push(&mut self, message: ValidationMessage) {
        (**self).push(message);
    }
}

/// Counts the errors flowing into an inner sink, so a pass can return its verdict.
pub struct Tally<'a> {
    inner: &'a mut dyn MessageSink,
    errors: usize,
}

impl<'a> Tally<'a> {
    pub fn new(inner: &'a mut dyn MessageSink) -> Self {
        Tally { inner, errors: 0 }
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn passed(&self) -> bool {
        self.errors == 0
    }
}

impl MessageSink for Tally<'_> {
    fn push(&mut self, message: ValidationMessage) {
        if message.is_error() {
            self.errors += 1;
        }
        self.inner.push(message);
    }
}

// ============================================================================
// COLLECTION
// ============================================================================

/// Named, ordered list of messages. Its verdict is "error" iff one message is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessageCollection {
    pub name: String,
    pub messages: Vec<ValidationMessage>,
}

impl ValidationMessageCollection {
    pub fn new(name: impl Into<String>) -> Self {
        ValidationMessageCollection {
            name: name.into(),
            messages: Vec::new(),
        }
    }

    pub fn contains_error(&self) -> bool {
        self.messages.iter().any(ValidationMessage::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_error()).count()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn summary(&self) -> &'static str {
        if self.contains_error() {
            Severity::Error.as_str()
        } else {
            Severity::Success.as_str()
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationMessage> {
        self.messages.iter()
    }
}

impl MessageSink for ValidationMessageCollection {
    fn push(&mut self, message: ValidationMessage) {
        self.messages.push(message);
    }
}

/// Thread-safe collection handle for validation passes run in parallel.
///
/// Appends are serialized through a mutex; clones share the same collection.
#[derive(Debug, Clone, Default)]
pub struct SharedCollection {
    inner: Arc<Mutex<ValidationMessageCollection>>,
}

impl SharedCollection {
    pub fn new(name: impl Into<String>) -> Self {
        SharedCollection {
            inner: Arc::new(Mutex::new(ValidationMessageCollection::new(name))),
        }
    }

    /// Copy of the collected messages so far.
    pub fn snapshot(&self) -> ValidationMessageCollection {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MessageSink for SharedCollection {
    fn push(&mut self, message: ValidationMessage) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_verdict() {
        let mut collection = ValidationMessageCollection::new("Profile");
        assert!(!collection.contains_error());
        assert_eq!(collection.summary(), "success");

        collection.push(ValidationMessage::success(Topic::Entity, "ok"));
        assert!(!collection.contains_error());

        collection.push(ValidationMessage::error(Topic::Entity, "bad"));
        assert!(collection.contains_error());
        assert_eq!(collection.error_count(), 1);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.summary(), "error");
    }

    #[test]
    fn test_tally_counts_errors_and_forwards() {
        let mut messages: Vec<ValidationMessage> = Vec::new();
        {
            let mut tally = Tally::new(&mut messages);
            tally.push(ValidationMessage::success(Topic::Value, "a"));
            tally.push(ValidationMessage::error(Topic::Value, "b"));
            tally.push(ValidationMessage::error(Topic::Value, "c"));
            assert_eq!(tally.errors(), 2);
            assert!(!tally.passed());
        }
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn test_shared_collection_serializes_parallel_appends() {
        let shared = SharedCollection::new("Value");

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let mut sink = shared.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        sink.push(ValidationMessage::success(Topic::Value, format!("{}-{}", i, j)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.snapshot().len(), 100);
    }

    #[test]
    fn test_display() {
        let msg = ValidationMessage::error(Topic::ContainerProfile, "profile mismatch");
        assert_eq!(msg.to_string(), "[error/ContainerProfile] profile mismatch");
    }
}
