//! Error types for the harness crate.

use vigil_core::CoreError;
use vigil_engine::EngineError;

/// Errors raised while running or exporting scenarios.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HarnessError {
    /// A scenario script is malformed.
    #[error("invalid scenario '{name}': {reason}")]
    InvalidScript { name: String, reason: String },

    /// The scenario input does not match how the runner was built.
    #[error("scenario '{name}' needs {needed} input, runner provides {available}")]
    InputMismatch { name: String, needed: &'static str, available: &'static str },

    /// The session stopped producing events.
    #[error("scenario '{name}' stalled: no session event for {waited_ms}ms")]
    Stalled { name: String, waited_ms: u64 },

    /// The session reported an error event during a run.
    #[error("session error during scenario '{name}': {message}")]
    Session { name: String, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
