// ⚠️ Error taxonomy
// Contract / Format / NotFound / OperationFailed. Validation findings are NOT errors,
// they travel as ValidationMessage values through a sink.

use std::error::Error as StdError;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Invalid argument, invalid path, or an operation attempted in the wrong lifecycle state
    #[error("contract violation: {0}")]
    Contract(String),

    /// Malformed identifier or a document that does not conform to its schema
    #[error("format error: {0}")]
    Format(String),

    /// Missing storage entry or unknown catalog id
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage or crypto failure, carrying the original cause
    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

pub type Result<T> = std::result::Result<T, ContainerError>;

impl ContainerError {
    pub fn contract(message: impl Into<String>) -> Self {
        ContainerError::Contract(message.into())
    }

    pub fn format(message: impl Into<String>) -> Self {
        ContainerError::Format(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ContainerError::NotFound(message.into())
    }

    pub fn failed<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ContainerError::OperationFailed {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }
}

/// Attach context to foreign errors, wrapping them as `OperationFailed`.
///
/// Mirrors `anyhow::Context` so library code reads the same as the CLI.
pub trait OperationContext<T> {
    fn op_context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T, E> OperationContext<T> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn op_context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| ContainerError::failed(context(), e))
    }
}
