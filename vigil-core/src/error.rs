/// Errors produced by the `vigil-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A score value was outside the valid range `[0.0, 1.0]`.
    #[error("invalid score {value}: must be in [0.0, 1.0]")]
    InvalidScore { value: f64 },

    /// Fusion weights were negative, non-finite, or did not sum to 1.0.
    #[error("invalid fusion weights (sum {sum:.4}): {reason}")]
    InvalidWeights { sum: f64, reason: String },

    /// State thresholds were not strictly descending inside `[0.0, 1.0]`.
    #[error("invalid state thresholds: {reason}")]
    InvalidThresholds { reason: String },

    /// A configuration field failed validation.
    #[error("configuration validation failed for field '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// The configuration document could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn config(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig { field: field.to_owned(), reason: reason.into() }
    }
}
