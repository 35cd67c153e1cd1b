//! Engine configuration.
//!
//! Configuration is loaded once (usually from JSON), validated, and then moved
//! into the engine, which never mutates it. Every section has defaults, so an
//! empty document `{}` yields the stock configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::state::VerificationState;

/// Maximum deviation of the fusion weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-2;

/// Complete, validated-on-load configuration for a verification engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct EngineConfig {
    /// Per-modality fusion weights.
    pub fusion: FusionWeights,
    /// Exponential moving average parameters.
    pub smoothing: SmoothingConfig,
    /// State thresholds and anti-flap parameters.
    pub hysteresis: HysteresisConfig,
    /// Tamper timers and escalation timeouts.
    pub tamper: TamperConfig,
    /// Post re-authentication probation.
    pub recovery: RecoveryConfig,
    /// Verification loop cadence and buffers.
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    /// Returns [`CoreError::ConfigParse`] for malformed JSON or unknown fields,
    /// and a validation error if any value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    /// Returns [`CoreError::Io`] if the file cannot be read, otherwise as
    /// [`EngineConfig::from_json_str`].
    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check every section.
    ///
    /// # Errors
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.fusion.validate()?;
        self.smoothing.validate()?;
        self.hysteresis.validate()?;
        self.tamper.validate()?;
        self.recovery.validate()?;
        self.scheduler.validate()
    }
}

/// Weights applied to each modality score during fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct FusionWeights {
    /// Face similarity weight.
    pub face: f64,
    /// Liveness weight.
    pub liveness: f64,
    /// Behavioural weight.
    pub behavior: f64,
}

impl FusionWeights {
    /// Creates a weight triple without validating it.
    #[must_use]
    pub const fn new(face: f64, liveness: f64, behavior: f64) -> Self {
        Self { face, liveness, behavior }
    }

    /// Sum of the three weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.face + self.liveness + self.behavior
    }

    /// Require finite, non-negative weights summing to 1.0 within
    /// [`WEIGHT_SUM_TOLERANCE`].
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidWeights`]; weights are never normalised.
    pub fn validate(&self) -> Result<(), CoreError> {
        let sum = self.sum();
        for (name, weight) in [
            ("face", self.face),
            ("liveness", self.liveness),
            ("behavior", self.behavior),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(CoreError::InvalidWeights {
                    sum,
                    reason: format!("{name} weight {weight} must be finite and non-negative"),
                });
            }
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(CoreError::InvalidWeights {
                sum,
                reason: format!("weights must sum to 1.0 within {WEIGHT_SUM_TOLERANCE}"),
            });
        }
        Ok(())
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::new(0.5, 0.2, 0.3)
    }
}

/// Parameters of the exponential moving average over fused trust.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct SmoothingConfig {
    /// Weight of the newest sample, in `(0, 1]`.
    pub alpha: f64,
}

impl SmoothingConfig {
    fn validate(&self) -> Result<(), CoreError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(CoreError::config("smoothing.alpha", format!("{} not in (0, 1]", self.alpha)));
        }
        Ok(())
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { alpha: 0.3 }
    }
}

/// Lower boundaries of each state band.
///
/// Trust strictly above `normal` is `NORMAL`, strictly above `watch` is
/// `WATCH`, strictly above `restrict` is `RESTRICT`, anything else `REAUTH`.
/// `reauth` is the floor of the `REAUTH` band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Thresholds {
    pub normal: f64,
    pub watch: f64,
    pub restrict: f64,
    pub reauth: f64,
}

impl Thresholds {
    /// Creates a threshold set without validating it.
    #[must_use]
    pub const fn new(normal: f64, watch: f64, restrict: f64, reauth: f64) -> Self {
        Self { normal, watch, restrict, reauth }
    }

    /// Require strictly descending values inside `[0, 1]`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidThresholds`].
    pub fn validate(&self) -> Result<(), CoreError> {
        let ordered = [self.normal, self.watch, self.restrict, self.reauth];
        if let Some(bad) = ordered.iter().find(|t| !(0.0..=1.0).contains(*t)) {
            return Err(CoreError::InvalidThresholds {
                reason: format!("threshold {bad} outside [0, 1]"),
            });
        }
        if !ordered.windows(2).all(|w| w[0] > w[1]) {
            return Err(CoreError::InvalidThresholds {
                reason: format!(
                    "thresholds must be strictly descending, got {} > {} > {} > {}",
                    self.normal, self.watch, self.restrict, self.reauth
                ),
            });
        }
        Ok(())
    }

    /// Map a trust value to the state band it falls in.
    #[must_use]
    pub fn classify(&self, trust: f64) -> VerificationState {
        if trust > self.normal {
            VerificationState::Normal
        } else if trust > self.watch {
            VerificationState::Watch
        } else if trust > self.restrict {
            VerificationState::Restrict
        } else {
            VerificationState::Reauth
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(0.7, 0.5, 0.3, 0.0)
    }
}

/// State thresholds plus the anti-flap margin and dwell time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct HysteresisConfig {
    /// Band boundaries.
    pub thresholds: Thresholds,
    /// Overshoot above a boundary required before relaxing.
    pub margin: f64,
    /// Minimum time in the current state before relaxing.
    pub min_dwell_ms: u64,
}

impl HysteresisConfig {
    /// Validate thresholds and margin.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidThresholds`] or [`CoreError::InvalidConfig`].
    pub fn validate(&self) -> Result<(), CoreError> {
        self.thresholds.validate()?;
        if !self.margin.is_finite() || !(0.0..1.0).contains(&self.margin) {
            return Err(CoreError::config("hysteresis.margin", format!("{} not in [0, 1)", self.margin)));
        }
        Ok(())
    }

    /// Minimum dwell as a `Duration`.
    #[must_use]
    pub fn min_dwell(&self) -> Duration {
        Duration::from_millis(self.min_dwell_ms)
    }
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self { thresholds: Thresholds::default(), margin: 0.05, min_dwell_ms: 2_000 }
    }
}

/// Tamper timers and the forced re-authentication timeout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct TamperConfig {
    /// Face/camera unavailability that forces at least `RESTRICT`.
    pub camera_off_timeout_ms: u64,
    /// Behaviour scores below this value count as anomalous.
    pub anomaly_threshold: f64,
    /// Anomalies within the window that force `REAUTH`.
    pub anomaly_count: usize,
    /// Sliding window for counting anomalies.
    pub anomaly_window_ms: u64,
    /// Continuous time in `RESTRICT` after which `REAUTH` is forced.
    pub restrict_timeout_ms: u64,
}

impl TamperConfig {
    fn validate(&self) -> Result<(), CoreError> {
        if self.camera_off_timeout_ms == 0 {
            return Err(CoreError::config("tamper.camera_off_timeout_ms", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.anomaly_threshold) {
            return Err(CoreError::config(
                "tamper.anomaly_threshold",
                format!("{} not in [0, 1]", self.anomaly_threshold),
            ));
        }
        if self.anomaly_count == 0 {
            return Err(CoreError::config("tamper.anomaly_count", "must be at least 1"));
        }
        if self.anomaly_window_ms == 0 {
            return Err(CoreError::config("tamper.anomaly_window_ms", "must be positive"));
        }
        if self.restrict_timeout_ms == 0 {
            return Err(CoreError::config("tamper.restrict_timeout_ms", "must be positive"));
        }
        Ok(())
    }
}

impl Default for TamperConfig {
    fn default() -> Self {
        Self {
            camera_off_timeout_ms: 5_000,
            anomaly_threshold: 0.3,
            anomaly_count: 3,
            anomaly_window_ms: 30_000,
            restrict_timeout_ms: 20_000,
        }
    }
}

/// Probation after a successful re-authentication.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct RecoveryConfig {
    /// Length of the stability window.
    pub duration_ms: u64,
    /// Smoothed trust the engine restarts from.
    pub baseline: f64,
    /// Trust that must be held for the whole window.
    pub stable_threshold: f64,
}

impl RecoveryConfig {
    fn validate(&self) -> Result<(), CoreError> {
        if self.duration_ms == 0 {
            return Err(CoreError::config("recovery.duration_ms", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.baseline) {
            return Err(CoreError::config("recovery.baseline", format!("{} not in [0, 1]", self.baseline)));
        }
        if !(0.0..=1.0).contains(&self.stable_threshold) {
            return Err(CoreError::config(
                "recovery.stable_threshold",
                format!("{} not in [0, 1]", self.stable_threshold),
            ));
        }
        Ok(())
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { duration_ms: 15_000, baseline: 0.8, stable_threshold: 0.7 }
    }
}

/// Verification loop cadence and buffer sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct SchedulerConfig {
    /// Ticks per second.
    pub frequency_hz: f64,
    /// Upper bound on a single provider call.
    pub provider_timeout_ms: u64,
    /// Samples retained in the trust history ring buffer.
    pub history_capacity: usize,
    /// Capacity of the session event channel.
    pub event_capacity: usize,
}

impl SchedulerConfig {
    /// Highest supported tick rate.
    pub const MAX_FREQUENCY_HZ: f64 = 100.0;

    fn validate(&self) -> Result<(), CoreError> {
        if !(self.frequency_hz > 0.0 && self.frequency_hz <= Self::MAX_FREQUENCY_HZ) {
            return Err(CoreError::config(
                "scheduler.frequency_hz",
                format!("{} not in (0, {}]", self.frequency_hz, Self::MAX_FREQUENCY_HZ),
            ));
        }
        if self.provider_timeout_ms == 0 {
            return Err(CoreError::config("scheduler.provider_timeout_ms", "must be positive"));
        }
        if self.history_capacity == 0 {
            return Err(CoreError::config("scheduler.history_capacity", "must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(CoreError::config("scheduler.event_capacity", "must be at least 1"));
        }
        Ok(())
    }

    /// Interval between ticks.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz)
    }

    /// Provider call timeout as a `Duration`.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 2.0,
            provider_timeout_ms: 2_000,
            history_capacity: 600,
            event_capacity: 1_024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config = match EngineConfig::from_json_str("{}") {
            Ok(c) => c,
            Err(e) => panic!("empty document must parse: {e}"),
        };
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_json_overrides_single_field() {
        let config = match EngineConfig::from_json_str(r#"{"smoothing": {"alpha": 0.5}}"#) {
            Ok(c) => c,
            Err(e) => panic!("partial document must parse: {e}"),
        };
        assert!((config.smoothing.alpha - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.hysteresis, HysteresisConfig::default());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = EngineConfig::from_json_str(r#"{"fusion_weights": {}}"#);
        assert!(matches!(result, Err(CoreError::ConfigParse(_))), "unknown sections must not be ignored");
    }

    #[test]
    fn weights_not_summing_to_one_are_rejected() {
        let weights = FusionWeights::new(0.5, 0.5, 0.5);
        assert!(matches!(weights.validate(), Err(CoreError::InvalidWeights { .. })));
    }

    #[test]
    fn weights_within_tolerance_are_accepted() {
        assert!(FusionWeights::new(0.5, 0.2, 0.305).validate().is_ok());
        assert!(FusionWeights::new(0.5, 0.2, 0.291).validate().is_ok());
    }

    #[test]
    fn negative_weight_is_rejected_even_if_sum_is_one() {
        let weights = FusionWeights::new(1.2, -0.2, 0.0);
        assert!(weights.validate().is_err());
    }

    #[test]
    fn thresholds_out_of_order_are_rejected() {
        let thresholds = Thresholds::new(0.5, 0.7, 0.3, 0.0);
        assert!(matches!(thresholds.validate(), Err(CoreError::InvalidThresholds { .. })));
        let equal = Thresholds::new(0.7, 0.7, 0.3, 0.0);
        assert!(equal.validate().is_err(), "equal thresholds are not strictly descending");
    }

    #[test]
    fn classify_uses_exclusive_lower_boundaries() {
        let t = Thresholds::default();
        assert_eq!(t.classify(0.71), VerificationState::Normal);
        assert_eq!(t.classify(0.7), VerificationState::Watch);
        assert_eq!(t.classify(0.5), VerificationState::Restrict);
        assert_eq!(t.classify(0.31), VerificationState::Restrict);
        assert_eq!(t.classify(0.3), VerificationState::Reauth);
        assert_eq!(t.classify(0.0), VerificationState::Reauth);
    }

    #[test]
    fn negative_margin_is_rejected() {
        let config = HysteresisConfig { margin: -0.01, ..HysteresisConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn scheduler_period_matches_frequency() {
        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.period(), Duration::from_millis(500));
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let mut config = EngineConfig::default();
        config.scheduler.frequency_hz = 0.0;
        assert!(config.validate().is_err());
    }
}
