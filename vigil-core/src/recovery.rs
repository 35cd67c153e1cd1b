//! Probationary monitoring after a successful re-authentication.
//!
//! The monitor exists only between a successful re-authentication and either
//! the end of a fully stable window or an abort. While it is active the state
//! machine may not relax past `WATCH`.

use serde::{Deserialize, Serialize};

use crate::config::RecoveryConfig;
use crate::state::VerificationState;
use crate::trust::TrustScore;

/// The active recovery window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RecoveryState {
    /// When re-authentication succeeded, in session milliseconds.
    pub entered_at_ms: u64,
    /// When the current stability window completes.
    pub ends_at_ms: u64,
    /// Trust that must be held until `ends_at_ms`.
    pub stable_threshold: TrustScore,
}

/// What happened to the recovery window on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RecoveryEvent {
    /// A window started after re-authentication.
    Entered,
    /// Trust dipped below the stable threshold; the window restarted.
    Restarted,
    /// Trust held for the full window; restrictions may relax.
    Completed,
    /// Trust fell to the restrict boundary; recovery abandoned.
    Aborted,
}

/// Owns the [`RecoveryState`] lifecycle.
#[derive(Debug, Clone)]
pub struct RecoveryMonitor {
    config: RecoveryConfig,
    state: Option<RecoveryState>,
}

impl RecoveryMonitor {
    /// Create an inactive monitor.
    #[must_use]
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config, state: None }
    }

    /// The active window, if any.
    #[must_use]
    pub fn state(&self) -> Option<RecoveryState> {
        self.state
    }

    /// Whether a window is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// Smoothed trust the engine restarts from on entry.
    #[must_use]
    pub fn baseline(&self) -> TrustScore {
        TrustScore::saturating(self.config.baseline)
    }

    /// Begin a window at `at_ms`.
    pub fn enter(&mut self, at_ms: u64) -> RecoveryEvent {
        self.state = Some(RecoveryState {
            entered_at_ms: at_ms,
            ends_at_ms: at_ms.saturating_add(self.config.duration_ms),
            stable_threshold: TrustScore::saturating(self.config.stable_threshold),
        });
        RecoveryEvent::Entered
    }

    /// Evaluate one tick's smoothed trust against the window.
    ///
    /// `restrict_boundary` is the trust at or below which the state machine
    /// would classify `RESTRICT`.
    pub fn observe(&mut self, trust: TrustScore, restrict_boundary: f64, at_ms: u64) -> Option<RecoveryEvent> {
        let state = self.state.as_mut()?;
        if trust.value() <= restrict_boundary {
            self.state = None;
            return Some(RecoveryEvent::Aborted);
        }
        if trust < state.stable_threshold {
            state.ends_at_ms = at_ms.saturating_add(self.config.duration_ms);
            return Some(RecoveryEvent::Restarted);
        }
        if at_ms >= state.ends_at_ms {
            self.state = None;
            return Some(RecoveryEvent::Completed);
        }
        None
    }

    /// Most permissive state allowed while the window is active.
    #[must_use]
    pub fn relax_limit(&self) -> Option<VerificationState> {
        self.state.map(|_| VerificationState::Watch)
    }

    /// Drop the window without completing it.
    pub fn abort(&mut self) -> Option<RecoveryEvent> {
        self.state.take().map(|_| RecoveryEvent::Aborted)
    }
}
