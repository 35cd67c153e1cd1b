//! Error types for the engine crate.

use vigil_core::{CoreError, ModalityKind};

/// Failures reported by a modality provider or re-authenticator.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider could not produce a result.
    #[error("{kind} provider failed: {reason}")]
    Failed { kind: ModalityKind, reason: String },

    /// The out-of-band re-authentication flow failed to run.
    #[error("re-authentication flow failed: {0}")]
    Reauth(String),
}

impl ProviderError {
    /// Shorthand for [`ProviderError::Failed`].
    pub fn failed(kind: ModalityKind, reason: impl Into<String>) -> Self {
        Self::Failed { kind, reason: reason.into() }
    }
}

/// Errors returned by [`crate::VerificationSession`] operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// `start()` was called while the session was running or starting.
    #[error("verification session is already running")]
    AlreadyRunning,

    /// The operation needs a running session.
    #[error("verification session is not running")]
    NotRunning,

    /// `stop()` was called while `start()` was still initialising providers.
    #[error("start cancelled by stop()")]
    StartCancelled,

    /// A provider failed to initialise; the session did not start.
    #[error("{kind} provider failed to initialise: {source}")]
    ProviderInit {
        kind: ModalityKind,
        #[source]
        source: ProviderError,
    },

    /// A provider was supplied in the wrong slot.
    #[error("expected a {expected} provider, got {actual}")]
    ProviderMismatch { expected: ModalityKind, actual: ModalityKind },

    /// The re-authenticator returned an error.
    #[error(transparent)]
    Reauth(ProviderError),

    /// Invalid engine configuration.
    #[error(transparent)]
    Core(#[from] CoreError),
}
