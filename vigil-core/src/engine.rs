//! Per-tick verification pipeline.
//!
//! [`TrustEngine`] owns every piece of mutable verification state and applies
//! one tick at a time: hold → fuse → tamper → smooth → recovery → state
//! machine. It performs no I/O and never sleeps; the caller supplies readings
//! and session time.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::fusion::{FusionEngine, ModalityHold};
use crate::history::RingBuffer;
use crate::machine::{Bounds, TrustStateMachine};
use crate::policy::{policy, EnforcementPolicy};
use crate::recovery::{RecoveryEvent, RecoveryMonitor, RecoveryState};
use crate::smoothing::TrustSmoother;
use crate::state::{StateTransition, VerificationState};
use crate::tamper::{TamperMonitor, TamperStatus};
use crate::trust::{ModalityKind, ModalityScore, TrustSample, TrustScore};

/// Everything that happened on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[non_exhaustive]
pub struct TickOutcome {
    /// The sample appended to history.
    pub sample: TrustSample,
    /// State change caused by this tick, if any.
    pub transition: Option<StateTransition>,
    /// Recovery window change caused by this tick, if any.
    pub recovery_event: Option<RecoveryEvent>,
    /// Tamper conditions after this tick.
    pub tamper: TamperStatus,
}

/// Read-only view of the engine for status endpoints and UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct EngineSnapshot {
    pub state: VerificationState,
    pub trust: TrustScore,
    pub state_entered_at_ms: u64,
    pub last_sample: Option<TrustSample>,
    pub recovery: Option<RecoveryState>,
    pub tamper: TamperStatus,
    pub policy: EnforcementPolicy,
    pub reauth_pending: bool,
}

/// Fusion, smoothing, tamper detection, recovery and the state machine behind
/// one owner.
#[derive(Debug, Clone)]
pub struct TrustEngine {
    config: EngineConfig,
    fusion: FusionEngine,
    hold: ModalityHold,
    smoother: TrustSmoother,
    tamper: TamperMonitor,
    tamper_status: TamperStatus,
    recovery: RecoveryMonitor,
    machine: TrustStateMachine,
    history: RingBuffer<TrustSample>,
    transitions: RingBuffer<StateTransition>,
    reauth_pending: bool,
}

impl TrustEngine {
    /// Build an engine from a configuration.
    ///
    /// # Errors
    /// Returns the first validation error in `config`.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let capacity = config.scheduler.history_capacity;
        Ok(Self {
            fusion: FusionEngine::new(config.fusion)?,
            hold: ModalityHold::new(),
            smoother: TrustSmoother::new(config.smoothing),
            tamper: TamperMonitor::new(config.tamper),
            tamper_status: TamperStatus::default(),
            recovery: RecoveryMonitor::new(config.recovery),
            machine: TrustStateMachine::new(config.hysteresis, config.tamper.restrict_timeout_ms),
            history: RingBuffer::new(capacity),
            transitions: RingBuffer::new(capacity),
            reauth_pending: false,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply one tick of readings taken at `at_ms`.
    ///
    /// `readings` must be in [`ModalityKind::ALL`] order.
    ///
    /// A tick that applies a queued re-authentication records the recovery
    /// baseline as its trust and moves to `WATCH` without evaluating the
    /// machine; its readings are not folded into the smoothed value.
    pub fn tick(&mut self, readings: [ModalityScore; 3], at_ms: u64) -> TickOutcome {
        debug_assert!(readings.iter().map(|r| r.kind).eq(ModalityKind::ALL));

        let [face, _, behavior] = readings;
        let mut tamper = self.tamper.observe(&face, &behavior, at_ms);
        let resolved = self.hold.resolve(readings);
        let fused = self.fusion.fuse_resolved(&resolved);

        let reauth = std::mem::take(&mut self.reauth_pending) && self.awaits_reauth();
        let (smoothed, transition, recovery_event) = if reauth {
            self.smoother.reset_to(self.recovery.baseline());
            self.tamper.clear_anomalies();
            tamper = self.tamper.status(at_ms);
            let entered = self.recovery.enter(at_ms);
            let smoothed = self.smoother.value();
            (smoothed, self.machine.reauthenticated(smoothed, at_ms), Some(entered))
        } else {
            let smoothed = self.smoother.update(fused.value);
            let mut recovery_event = self.recovery.observe(smoothed, self.machine.restrict_boundary(), at_ms);
            let bounds = Bounds { floor: tamper.floor(), relax_limit: self.recovery.relax_limit() };
            let transition = self.machine.evaluate(smoothed, bounds, at_ms);
            if transition.is_some_and(|t| t.to > VerificationState::Watch) {
                recovery_event = self.recovery.abort().or(recovery_event);
            }
            (smoothed, transition, recovery_event)
        };

        if let Some(event) = recovery_event {
            tracing::info!(?event, at_ms, trust = %smoothed, "recovery window update");
        }

        let [face, liveness, behavior] = resolved;
        let sample = TrustSample {
            face,
            liveness,
            behavior,
            raw_fused: fused.value,
            smoothed,
            confidence: fused.confidence,
            at_ms,
        };
        self.history.push(sample);
        if let Some(t) = transition {
            self.transitions.push(t);
        }
        self.tamper_status = tamper;

        TickOutcome { sample, transition, recovery_event, tamper }
    }

    /// Queue a successful re-authentication for the next tick.
    ///
    /// Ignored (returns `false`) unless the state is `RESTRICT` or `REAUTH`.
    pub fn request_reauth(&mut self) -> bool {
        if !self.awaits_reauth() {
            tracing::debug!(state = %self.machine.state(), "re-authentication ignored");
            return false;
        }
        self.reauth_pending = true;
        true
    }

    fn awaits_reauth(&self) -> bool {
        matches!(self.machine.state(), VerificationState::Restrict | VerificationState::Reauth)
    }

    #[must_use]
    pub fn state(&self) -> VerificationState {
        self.machine.state()
    }

    /// Current smoothed trust.
    #[must_use]
    pub fn trust(&self) -> TrustScore {
        self.smoother.value()
    }

    #[must_use]
    pub fn recovery(&self) -> Option<RecoveryState> {
        self.recovery.state()
    }

    #[must_use]
    pub fn tamper_status(&self) -> TamperStatus {
        self.tamper_status
    }

    /// Enforcement policy for the current state.
    #[must_use]
    pub fn policy(&self) -> EnforcementPolicy {
        policy(self.machine.state(), self.recovery.state().as_ref())
    }

    #[must_use]
    pub fn last_sample(&self) -> Option<TrustSample> {
        self.history.last().copied()
    }

    /// Retained samples, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<TrustSample> {
        self.history.to_vec()
    }

    /// Retained transitions, oldest first.
    #[must_use]
    pub fn transitions(&self) -> Vec<StateTransition> {
        self.transitions.to_vec()
    }

    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.machine.state(),
            trust: self.smoother.value(),
            state_entered_at_ms: self.machine.entered_at_ms(),
            last_sample: self.last_sample(),
            recovery: self.recovery.state(),
            tamper: self.tamper_status,
            policy: self.policy(),
            reauth_pending: self.reauth_pending,
        }
    }

    /// Return to `NORMAL` at full trust, keeping history and transitions.
    pub fn reset_live_state(&mut self) {
        self.hold.clear();
        self.smoother.reset();
        self.tamper.reset();
        self.tamper_status = TamperStatus::default();
        self.recovery.abort();
        self.machine.reset(0);
        self.reauth_pending = false;
    }

    /// Full reset for a new session, clearing history and transitions.
    pub fn reset(&mut self) {
        self.reset_live_state();
        self.history.clear();
        self.transitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TransitionReason;

    const TICK_MS: u64 = 500;

    fn engine() -> TrustEngine {
        match TrustEngine::new(EngineConfig::default()) {
            Ok(e) => e,
            Err(e) => panic!("default config must build: {e}"),
        }
    }

    fn readings(face: Option<f64>, liveness: Option<f64>, behavior: Option<f64>, at_ms: u64) -> [ModalityScore; 3] {
        let score = |kind, value: Option<f64>| match value {
            Some(v) => ModalityScore::observed(kind, TrustScore::saturating(v), at_ms),
            None => ModalityScore::unavailable(kind, at_ms),
        };
        [
            score(ModalityKind::Face, face),
            score(ModalityKind::Liveness, liveness),
            score(ModalityKind::Behavior, behavior),
        ]
    }

    /// Run ticks over `[from_ms, to_ms)` with constant readings.
    fn run(
        engine: &mut TrustEngine,
        from_ms: u64,
        to_ms: u64,
        values: (Option<f64>, Option<f64>, Option<f64>),
    ) -> Vec<StateTransition> {
        (from_ms..to_ms)
            .step_by(usize::try_from(TICK_MS).unwrap_or(1))
            .filter_map(|at| engine.tick(readings(values.0, values.1, values.2, at), at).transition)
            .collect()
    }

    #[test]
    fn steady_owner_stays_normal() {
        let mut e = engine();
        let transitions = run(&mut e, 0, 60_000, (Some(0.95), Some(0.9), Some(0.9)));
        assert!(transitions.is_empty(), "unexpected transitions: {transitions:?}");
        assert!((e.trust().value() - 0.925).abs() < 1e-3);
        assert_eq!(e.policy(), policy(VerificationState::Normal, None));
    }

    #[test]
    fn face_mismatch_restricts_then_times_out() {
        let mut e = engine();
        let transitions = run(&mut e, 0, 30_000, (Some(0.0), Some(0.9), Some(0.9)));
        let path: Vec<_> = transitions.iter().map(|t| (t.to, t.at_ms, t.reason)).collect();
        assert_eq!(
            path,
            vec![
                (VerificationState::Watch, 1_000, TransitionReason::ThresholdCross),
                (VerificationState::Restrict, 3_000, TransitionReason::ThresholdCross),
                (VerificationState::Reauth, 23_000, TransitionReason::ForcedReauthTimeout),
            ]
        );
    }

    #[test]
    fn behaviour_drift_holds_watch_through_anomaly_floor() {
        let mut e = engine();
        let transitions = run(&mut e, 0, 30_000, (Some(0.95), Some(0.9), Some(0.2)));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].reason, TransitionReason::Tamper);
        assert_eq!(e.state(), VerificationState::Watch);
    }

    #[test]
    fn covered_camera_restricts_after_timeout() {
        let mut e = engine();
        run(&mut e, 0, 5_000, (Some(0.95), Some(0.9), Some(0.9)));
        let transitions = run(&mut e, 5_000, 25_000, (None, None, Some(0.9)));
        assert_eq!(transitions.len(), 1, "{transitions:?}");
        assert_eq!(transitions[0].to, VerificationState::Restrict);
        assert_eq!(transitions[0].at_ms, 10_000);
        assert_eq!(transitions[0].reason, TransitionReason::Tamper);
        let confidence = e.last_sample().map_or(0.0, |s| s.confidence);
        assert!((confidence - 0.3).abs() < 1e-9, "only behaviour weight is fresh, got {confidence}");
    }

    #[test]
    fn reauth_enters_recovery_and_relaxes_after_window() {
        let mut e = engine();
        run(&mut e, 0, 10_000, (Some(0.1), Some(0.1), Some(0.1)));
        assert_eq!(e.state(), VerificationState::Reauth);

        assert!(e.request_reauth());
        let outcome = e.tick(readings(Some(0.95), Some(0.9), Some(0.9), 10_000), 10_000);
        assert_eq!(outcome.recovery_event, Some(RecoveryEvent::Entered));
        let Some(t) = outcome.transition else { panic!("reauth must transition") };
        assert_eq!((t.from, t.to, t.reason), (VerificationState::Reauth, VerificationState::Watch, TransitionReason::ManualReauth));
        assert!(e.policy().requires_confirmation);
        assert_eq!(e.policy().blur_px, 0, "provisional policy has no blur");

        let transitions = run(&mut e, 10_500, 35_000, (Some(0.95), Some(0.9), Some(0.9)));
        assert_eq!(transitions.len(), 1, "{transitions:?}");
        assert_eq!(transitions[0].to, VerificationState::Normal);
        assert_eq!(transitions[0].at_ms, 25_000);
        assert!(e.recovery().is_none());
    }

    #[test]
    fn reauth_tick_records_the_recovery_baseline() {
        let mut e = engine();
        run(&mut e, 0, 10_000, (Some(0.1), Some(0.1), Some(0.1)));
        assert!(e.request_reauth());

        let outcome = e.tick(readings(Some(0.1), Some(0.1), Some(0.1), 10_000), 10_000);
        let Some(t) = outcome.transition else { panic!("reauth must transition") };
        assert!((t.triggering_trust.value() - 0.8).abs() < 1e-9, "got {}", t.triggering_trust);
        assert!((outcome.sample.smoothed.value() - 0.8).abs() < 1e-9, "entry tick must not fold its reading");

        let next = e.tick(readings(Some(0.1), Some(0.1), Some(0.1), 10_500), 10_500);
        assert!(next.sample.smoothed.value() < 0.8, "readings fold in from the following tick");
    }

    #[test]
    fn reauth_request_ignored_in_normal() {
        let mut e = engine();
        assert!(!e.request_reauth());
        assert!(!e.snapshot().reauth_pending);
    }

    #[test]
    fn drop_during_recovery_aborts_it() {
        let mut e = engine();
        run(&mut e, 0, 5_000, (Some(0.1), Some(0.1), Some(0.1)));
        assert!(e.request_reauth());
        run(&mut e, 5_000, 5_500, (Some(0.95), Some(0.9), Some(0.9)));
        assert!(e.recovery().is_some());
        run(&mut e, 5_500, 10_000, (Some(0.0), Some(0.0), Some(0.9)));
        assert!(e.recovery().is_none(), "falling to RESTRICT must abort recovery");
        assert!(e.state() >= VerificationState::Restrict);
    }

    #[test]
    fn reset_live_state_keeps_history() {
        let mut e = engine();
        run(&mut e, 0, 3_000, (Some(0.0), Some(0.0), Some(0.0)));
        let retained = e.history().len();
        e.reset_live_state();
        assert_eq!(e.state(), VerificationState::Normal);
        assert_eq!(e.trust(), TrustScore::MAX);
        assert_eq!(e.history().len(), retained);
        e.reset();
        assert!(e.history().is_empty());
        assert!(e.transitions().is_empty());
    }

    #[test]
    fn history_is_bounded_by_capacity() {
        let mut config = EngineConfig::default();
        config.scheduler.history_capacity = 10;
        let mut e = match TrustEngine::new(config) {
            Ok(e) => e,
            Err(err) => panic!("config must build: {err}"),
        };
        run(&mut e, 0, 10_000, (Some(0.9), Some(0.9), Some(0.9)));
        assert_eq!(e.history().len(), 10);
        assert_eq!(e.history().first().map(|s| s.at_ms), Some(5_000));
    }
}
