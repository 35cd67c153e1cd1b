//! Tamper conditions that escalate state independently of smoothed trust.
//!
//! - Face/camera unavailable for `camera_off_timeout_ms` → at least `RESTRICT`.
//! - `anomaly_count` behaviour anomalies within `anomaly_window_ms` → `REAUTH`.
//! - An ongoing behaviour anomaly → at least `WATCH`.
//!
//! An anomaly is counted on the tick the behaviour score enters the anomalous
//! band, not on every tick it stays there.

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::TamperConfig;
use crate::state::VerificationState;
use crate::trust::ModalityScore;

/// Snapshot of tamper conditions after one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[non_exhaustive]
pub struct TamperStatus {
    /// How long the face modality has been unavailable, if it is.
    pub camera_off_ms: Option<u64>,
    /// Camera-off timeout has elapsed.
    pub camera_tampered: bool,
    /// The latest behaviour score is anomalous.
    pub anomaly_active: bool,
    /// Anomalies counted inside the sliding window.
    pub recent_anomalies: usize,
    /// Anomaly count reached the configured limit.
    pub anomaly_burst: bool,
}

impl TamperStatus {
    /// The least restrictive state allowed under the current conditions.
    #[must_use]
    pub fn floor(&self) -> Option<VerificationState> {
        if self.anomaly_burst {
            Some(VerificationState::Reauth)
        } else if self.camera_tampered {
            Some(VerificationState::Restrict)
        } else if self.anomaly_active {
            Some(VerificationState::Watch)
        } else {
            None
        }
    }
}

/// Tracks camera-off time and the behaviour anomaly window.
#[derive(Debug, Clone)]
pub struct TamperMonitor {
    config: TamperConfig,
    camera_off_since: Option<u64>,
    behavior_anomalous: bool,
    anomalies: VecDeque<u64>,
}

impl TamperMonitor {
    /// Create a monitor with no conditions active.
    #[must_use]
    pub fn new(config: TamperConfig) -> Self {
        Self { config, camera_off_since: None, behavior_anomalous: false, anomalies: VecDeque::new() }
    }

    /// Update timers from this tick's raw (unheld) face and behaviour scores.
    pub fn observe(&mut self, face: &ModalityScore, behavior: &ModalityScore, at_ms: u64) -> TamperStatus {
        if face.available {
            self.camera_off_since = None;
        } else if self.camera_off_since.is_none() {
            self.camera_off_since = Some(at_ms);
        }

        // Unavailable behaviour keeps the previous anomaly flag.
        if behavior.available {
            let anomalous = behavior.value.value() < self.config.anomaly_threshold;
            if anomalous && !self.behavior_anomalous {
                self.anomalies.push_back(at_ms);
                tracing::debug!(at_ms, score = %behavior.value, "behaviour anomaly detected");
            }
            self.behavior_anomalous = anomalous;
        }

        self.status(at_ms)
    }

    /// Current status without recording a new observation.
    pub fn status(&mut self, at_ms: u64) -> TamperStatus {
        let window = self.config.anomaly_window_ms;
        while self.anomalies.front().is_some_and(|&t| at_ms.saturating_sub(t) >= window) {
            self.anomalies.pop_front();
        }
        let camera_off_ms = self.camera_off_since.map(|since| at_ms.saturating_sub(since));
        TamperStatus {
            camera_off_ms,
            camera_tampered: camera_off_ms.is_some_and(|ms| ms >= self.config.camera_off_timeout_ms),
            anomaly_active: self.behavior_anomalous,
            recent_anomalies: self.anomalies.len(),
            anomaly_burst: self.anomalies.len() >= self.config.anomaly_count,
        }
    }

    /// Forget counted anomalies (after a successful re-authentication).
    pub fn clear_anomalies(&mut self) {
        self.anomalies.clear();
        self.behavior_anomalous = false;
    }

    /// Clear every timer and counter.
    pub fn reset(&mut self) {
        self.camera_off_since = None;
        self.clear_anomalies();
    }
}
