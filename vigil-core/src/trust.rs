use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A normalised trust or modality score in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
#[non_exhaustive]
pub struct TrustScore(f64);

impl TrustScore {
    /// Full trust, the value every session starts from.
    pub const MAX: Self = Self(1.0);

    /// No trust at all.
    pub const MIN: Self = Self(0.0);

    /// Creates a `TrustScore` from a value in `[0.0, 1.0]`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidScore`] if `value` is NaN, infinite, or
    /// outside `[0.0, 1.0]`.
    pub fn new(value: f64) -> Result<Self, CoreError> {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            return Err(CoreError::InvalidScore { value });
        }
        Ok(Self(value))
    }

    /// Creates a `TrustScore`, clamping finite values into `[0.0, 1.0]`.
    ///
    /// NaN maps to `0.0` so a broken computation can never read as trust.
    #[must_use]
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            return Self::MIN;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Returns the inner `f64` value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for TrustScore {
    type Error = CoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TrustScore> for f64 {
    fn from(score: TrustScore) -> Self {
        score.0
    }
}

impl fmt::Display for TrustScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// The biometric channel a score was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalityKind {
    /// Face similarity against the enrolled owner.
    Face,
    /// Liveness (presentation-attack) confidence.
    Liveness,
    /// Behavioural-biometric conformance; low values indicate anomalies.
    Behavior,
}

impl ModalityKind {
    /// All modalities in fusion order.
    pub const ALL: [Self; 3] = [Self::Face, Self::Liveness, Self::Behavior];

    /// Lower-case name used in logs and exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Liveness => "liveness",
            Self::Behavior => "behavior",
        }
    }
}

impl fmt::Display for ModalityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One modality's contribution to a single verification tick.
///
/// When `available` is false, `value` is the last-known value the engine
/// held for this modality (or `0.0` before any sample arrived).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ModalityScore {
    /// Which provider produced the score.
    pub kind: ModalityKind,
    /// Normalised score.
    pub value: TrustScore,
    /// Whether the provider produced a fresh value this tick.
    pub available: bool,
    /// Milliseconds since session start.
    pub at_ms: u64,
}

impl ModalityScore {
    /// A fresh reading from a provider.
    #[must_use]
    pub fn observed(kind: ModalityKind, value: TrustScore, at_ms: u64) -> Self {
        Self { kind, value, available: true, at_ms }
    }

    /// A tick where the provider had no signal.
    #[must_use]
    pub fn unavailable(kind: ModalityKind, at_ms: u64) -> Self {
        Self { kind, value: TrustScore::MIN, available: false, at_ms }
    }

    /// Builds a score from a raw provider reading.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidScore`] if the reading claims to be
    /// available but its value is not a valid score.
    pub fn from_reading(
        kind: ModalityKind,
        value: f64,
        available: bool,
        at_ms: u64,
    ) -> Result<Self, CoreError> {
        if !available {
            return Ok(Self::unavailable(kind, at_ms));
        }
        Ok(Self::observed(kind, TrustScore::new(value)?, at_ms))
    }
}

/// The fused and smoothed result of one scheduler tick.
///
/// Samples are immutable once created and are retained in a bounded history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TrustSample {
    /// Face score used for fusion (held if unavailable).
    pub face: ModalityScore,
    /// Liveness score used for fusion (held if unavailable).
    pub liveness: ModalityScore,
    /// Behaviour score used for fusion (held if unavailable).
    pub behavior: ModalityScore,
    /// Weighted sum of the three modality values.
    pub raw_fused: TrustScore,
    /// Exponential moving average after this tick.
    pub smoothed: TrustScore,
    /// Weight mass of the modalities that were fresh this tick.
    pub confidence: f64,
    /// Milliseconds since session start.
    pub at_ms: u64,
}
