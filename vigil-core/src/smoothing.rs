//! Exponential moving average over fused trust.

use crate::config::SmoothingConfig;
use crate::trust::TrustScore;

/// One EMA step: `alpha·raw + (1 - alpha)·previous`, clamped to `[0, 1]`.
#[must_use]
pub fn smooth(raw: TrustScore, previous: TrustScore, alpha: f64) -> TrustScore {
    TrustScore::saturating(alpha * raw.value() + (1.0 - alpha) * previous.value())
}

/// Stateful smoother holding the current smoothed trust.
///
/// A new smoother starts at full trust, so a fresh login is never degraded by
/// one bad first reading. [`TrustSmoother::reset`] is the only way back to
/// full trust.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustSmoother {
    alpha: f64,
    value: TrustScore,
}

impl TrustSmoother {
    /// Create a smoother at full trust.
    #[must_use]
    pub fn new(config: SmoothingConfig) -> Self {
        Self { alpha: config.alpha, value: TrustScore::MAX }
    }

    /// Current smoothed trust.
    #[must_use]
    pub fn value(&self) -> TrustScore {
        self.value
    }

    /// Fold one fused sample into the average and return the new value.
    pub fn update(&mut self, raw: TrustScore) -> TrustScore {
        self.value = smooth(raw, self.value, self.alpha);
        self.value
    }

    /// Return to full trust (stop, logout, new session).
    pub fn reset(&mut self) {
        self.value = TrustScore::MAX;
    }

    /// Restart from a provisional baseline (re-authentication).
    pub fn reset_to(&mut self, baseline: TrustScore) {
        self.value = baseline;
    }
}
