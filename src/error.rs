//! Shared error taxonomy across composition, generation, storage, and
//! persistence.
//!
//! Every error here resolves to either rejecting a submission before any
//! history mutation or appending a visible, recoverable message; none is
//! fatal to the process.

use crate::models::Surface;

/// A submission was rejected before any history mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    #[error("nothing to submit: text is empty and no attachments were provided")]
    EmptySubmission,
    #[error("no document is loaded for analysis")]
    MissingDocument,
}

/// A generation provider request or stream failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

/// A guarded message-store replacement was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("message index {index} is out of range on surface {surface}")]
    IndexOutOfRange { surface: Surface, index: usize },
    #[error("refusing to replace non-model message at index {index} on surface {surface}")]
    RoleMismatch { surface: Surface, index: usize },
}

/// The keyed storage capability failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage write failed: {0}")]
    Storage(String),
}

/// Outcome of [`crate::orchestrator::Orchestrator::submit`].
///
/// `Provider` is returned *after* the fixed failure text has been recorded in
/// the conversation; it exists so the UI can additionally show a transient
/// error state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Composition(#[from] CompositionError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
