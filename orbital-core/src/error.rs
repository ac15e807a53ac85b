//! Error Types
//!
//! Every failure the container can report flows through [`ContainerError`].
//! Intent bodies return the looser [`IntentResult`] so that they can use `?`
//! on any error type; the scheduler recovers the original `ContainerError`
//! when an intent propagates one.

use thiserror::Error;

/// Error type returned by intent bodies and fallible reductions.
pub type IntentError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of running an intent body.
pub type IntentResult = Result<(), IntentError>;

/// Errors surfaced by the container, its scheduler and its decorators.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// A reduction's transform returned an error. The state was not changed.
    #[error("reduction failed: {0}")]
    Reduction(#[source] IntentError),

    /// A reduction's transform panicked. The state was not changed.
    #[error("reduction panicked: {0}")]
    ReductionPanicked(String),

    /// An intent body returned an error.
    #[error("intent failed: {0}")]
    Intent(#[source] IntentError),

    /// An intent body panicked.
    #[error("intent panicked: {0}")]
    IntentPanicked(String),

    /// The intent was cancelled before it finished.
    #[error("intent cancelled")]
    Cancelled,

    /// The scheduler refused the submission because too many intents are in flight.
    #[error("scheduler saturated: {limit} intents already in flight")]
    Saturated { limit: usize },

    /// The container was shut down, either explicitly or by an escalated failure.
    #[error("container is closed")]
    Closed,

    /// No tokio runtime was available to launch intents on.
    #[error("no tokio runtime available; build inside a runtime or pass a handle")]
    NoRuntime,

    /// The configuration document could not be parsed.
    #[error("invalid container config: {0}")]
    Config(#[from] serde_json::Error),

    /// A state snapshot could not be encoded.
    #[error("failed to encode state snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A state snapshot could not be decoded.
    #[error("failed to decode state snapshot: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl ContainerError {
    /// Recover a `ContainerError` from an intent's boxed error, wrapping
    /// anything else as [`ContainerError::Intent`].
    pub fn from_intent_error(error: IntentError) -> Self {
        match error.downcast::<ContainerError>() {
            Ok(inner) => *inner,
            Err(other) => ContainerError::Intent(other),
        }
    }

    /// Whether this error came out of a reduction (as opposed to the intent body).
    pub fn is_reduction(&self) -> bool {
        matches!(
            self,
            ContainerError::Reduction(_) | ContainerError::ReductionPanicked(_)
        )
    }
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
