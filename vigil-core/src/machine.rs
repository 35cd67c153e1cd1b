//! Hysteresis state machine over smoothed trust.
//!
//! Escalation is immediate: the tick trust falls into a more restrictive band
//! (or a tamper floor demands one) the state moves there. Relaxation needs two
//! things: trust above the target band's boundary by at least the hysteresis
//! margin, and at least `min_dwell_ms` spent in the current state. `REAUTH` is
//! latched and only [`TrustStateMachine::reauthenticated`] leaves it.

use crate::config::HysteresisConfig;
use crate::state::{StateTransition, TransitionReason, VerificationState};
use crate::trust::TrustScore;

/// Outside constraints applied to one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    /// Least restrictive state allowed right now (tamper conditions).
    pub floor: Option<VerificationState>,
    /// Least restrictive state the machine may relax to (recovery window).
    pub relax_limit: Option<VerificationState>,
}

/// Four-state machine with asymmetric hysteresis.
#[derive(Debug, Clone)]
pub struct TrustStateMachine {
    config: HysteresisConfig,
    restrict_timeout_ms: u64,
    state: VerificationState,
    entered_at_ms: u64,
}

impl TrustStateMachine {
    /// Start in `NORMAL` at session time zero.
    #[must_use]
    pub fn new(config: HysteresisConfig, restrict_timeout_ms: u64) -> Self {
        Self { config, restrict_timeout_ms, state: VerificationState::Normal, entered_at_ms: 0 }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> VerificationState {
        self.state
    }

    /// When the current state was entered.
    #[must_use]
    pub fn entered_at_ms(&self) -> u64 {
        self.entered_at_ms
    }

    /// Trust at or below which the machine classifies `RESTRICT`.
    #[must_use]
    pub fn restrict_boundary(&self) -> f64 {
        self.config.thresholds.watch
    }

    /// Evaluate one tick of smoothed trust.
    ///
    /// Returns the transition taken, if any.
    pub fn evaluate(&mut self, trust: TrustScore, bounds: Bounds, at_ms: u64) -> Option<StateTransition> {
        if self.state == VerificationState::Reauth {
            return None;
        }

        let thresholds = &self.config.thresholds;
        let classified = thresholds.classify(trust.value());
        let target = bounds.floor.map_or(classified, |floor| floor.max(classified));

        if target > self.state {
            let reason = if target > classified {
                TransitionReason::Tamper
            } else {
                TransitionReason::ThresholdCross
            };
            return Some(self.transition(target, trust, reason, at_ms));
        }

        let dwelt = at_ms.saturating_sub(self.entered_at_ms);

        if self.state == VerificationState::Restrict && dwelt >= self.restrict_timeout_ms {
            return Some(self.transition(
                VerificationState::Reauth,
                trust,
                TransitionReason::ForcedReauthTimeout,
                at_ms,
            ));
        }

        if dwelt < self.config.min_dwell_ms {
            return None;
        }

        let relaxed = [bounds.floor, bounds.relax_limit]
            .into_iter()
            .flatten()
            .fold(thresholds.classify(trust.value() - self.config.margin), VerificationState::max);

        (relaxed < self.state).then(|| self.transition(relaxed, trust, TransitionReason::ThresholdCross, at_ms))
    }

    /// Leave `RESTRICT` or `REAUTH` for `WATCH` after a successful
    /// re-authentication.
    ///
    /// Returns `None` if the machine was not in a state that requires it.
    pub fn reauthenticated(&mut self, trust: TrustScore, at_ms: u64) -> Option<StateTransition> {
        matches!(self.state, VerificationState::Restrict | VerificationState::Reauth).then(|| {
            self.transition(VerificationState::Watch, trust, TransitionReason::ManualReauth, at_ms)
        })
    }

    /// Return to `NORMAL` without recording a transition.
    pub fn reset(&mut self, at_ms: u64) {
        self.state = VerificationState::Normal;
        self.entered_at_ms = at_ms;
    }

    fn transition(
        &mut self,
        to: VerificationState,
        trust: TrustScore,
        reason: TransitionReason,
        at_ms: u64,
    ) -> StateTransition {
        let from = self.state;
        self.state = to;
        self.entered_at_ms = at_ms;
        tracing::info!(%from, %to, at_ms, trust = %trust, %reason, "state transition");
        StateTransition { from, to, at_ms, triggering_trust: trust, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> TrustStateMachine {
        TrustStateMachine::new(HysteresisConfig::default(), 20_000)
    }

    fn score(value: f64) -> TrustScore {
        TrustScore::saturating(value)
    }

    fn unbounded() -> Bounds {
        Bounds::default()
    }

    #[test]
    fn escalation_is_immediate_and_may_skip_states() {
        let mut m = machine();
        let t = m.evaluate(score(0.2), unbounded(), 100);
        let Some(t) = t else { panic!("0.2 must escalate") };
        assert_eq!(t.from, VerificationState::Normal);
        assert_eq!(t.to, VerificationState::Reauth);
        assert_eq!(t.reason, TransitionReason::ThresholdCross);
    }

    #[test]
    fn relaxation_waits_for_dwell() {
        let mut m = machine();
        assert!(m.evaluate(score(0.6), unbounded(), 0).is_some());
        assert_eq!(m.evaluate(score(0.9), unbounded(), 1_500), None, "dwell not yet satisfied");
        let Some(t) = m.evaluate(score(0.9), unbounded(), 2_000) else { panic!("dwell satisfied") };
        assert_eq!(t.to, VerificationState::Normal);
    }

    #[test]
    fn relaxation_requires_margin_above_boundary() {
        let mut m = machine();
        assert!(m.evaluate(score(0.6), unbounded(), 0).is_some());
        assert_eq!(m.evaluate(score(0.74), unbounded(), 5_000), None, "0.74 is inside the margin");
        assert!(m.evaluate(score(0.76), unbounded(), 5_500).is_some());
    }

    #[test]
    fn trust_just_above_boundary_does_not_flap() {
        let mut m = machine();
        assert!(m.evaluate(score(0.69), unbounded(), 0).is_some());
        for (i, value) in [0.71, 0.69, 0.72, 0.70, 0.73].into_iter().enumerate() {
            let at = (u64::try_from(i).unwrap_or(0) + 1) * 5_000;
            assert_eq!(m.evaluate(score(value), unbounded(), at), None, "{value} must not cause a transition");
        }
    }

    #[test]
    fn reauth_is_latched() {
        let mut m = machine();
        assert!(m.evaluate(score(0.1), unbounded(), 0).is_some());
        assert_eq!(m.evaluate(score(1.0), unbounded(), 60_000), None);
        assert_eq!(m.state(), VerificationState::Reauth);
    }

    #[test]
    fn manual_reauth_moves_to_watch() {
        let mut m = machine();
        assert!(m.evaluate(score(0.1), unbounded(), 0).is_some());
        let Some(t) = m.reauthenticated(score(0.8), 10_000) else { panic!("REAUTH must accept reauth") };
        assert_eq!(t.to, VerificationState::Watch);
        assert_eq!(t.reason, TransitionReason::ManualReauth);
        assert_eq!(m.reauthenticated(score(0.8), 11_000), None, "WATCH does not need reauth");
    }

    #[test]
    fn restrict_times_out_into_reauth() {
        let mut m = machine();
        assert!(m.evaluate(score(0.45), unbounded(), 3_000).is_some());
        assert_eq!(m.evaluate(score(0.45), unbounded(), 22_500), None);
        let Some(t) = m.evaluate(score(0.45), unbounded(), 23_000) else { panic!("timeout must fire") };
        assert_eq!(t.to, VerificationState::Reauth);
        assert_eq!(t.reason, TransitionReason::ForcedReauthTimeout);
    }

    #[test]
    fn tamper_floor_escalates_with_tamper_reason() {
        let mut m = machine();
        let bounds = Bounds { floor: Some(VerificationState::Restrict), relax_limit: None };
        let Some(t) = m.evaluate(score(0.95), bounds, 10_000) else { panic!("floor must escalate") };
        assert_eq!(t.to, VerificationState::Restrict);
        assert_eq!(t.reason, TransitionReason::Tamper);
        assert_eq!(m.evaluate(score(0.95), bounds, 15_000), None, "floor holds the state");
    }

    #[test]
    fn relax_limit_caps_relaxation() {
        let mut m = machine();
        assert!(m.evaluate(score(0.1), unbounded(), 0).is_some());
        assert!(m.reauthenticated(score(0.8), 1_000).is_some());
        let bounds = Bounds { floor: None, relax_limit: Some(VerificationState::Watch) };
        assert_eq!(m.evaluate(score(0.95), bounds, 10_000), None);
        assert!(m.evaluate(score(0.95), unbounded(), 10_500).is_some());
    }

    proptest::proptest! {
        #[test]
        fn proptest_relaxations_respect_dwell_and_margin(values in proptest::collection::vec(0.0f64..=1.0, 1..200)) {
            let config = HysteresisConfig::default();
            let mut m = TrustStateMachine::new(config, u64::MAX);
            let mut last_at = 0u64;
            for (i, value) in values.iter().enumerate() {
                let at = u64::try_from(i).unwrap_or(0) * 500;
                if let Some(t) = m.evaluate(score(*value), Bounds::default(), at) {
                    if !t.is_escalation() {
                        proptest::prop_assert!(at - last_at >= config.min_dwell_ms, "relaxed after {}ms", at - last_at);
                        proptest::prop_assert!(config.thresholds.classify(value - config.margin) <= t.to);
                    }
                    last_at = at;
                }
            }
        }

        #[test]
        fn proptest_escalation_is_never_delayed(values in proptest::collection::vec(0.0f64..=1.0, 1..200)) {
            let config = HysteresisConfig::default();
            let mut m = TrustStateMachine::new(config, u64::MAX);
            for (i, value) in values.iter().enumerate() {
                let at = u64::try_from(i).unwrap_or(0) * 500;
                let before = m.state();
                let classified = config.thresholds.classify(*value);
                let _ = m.evaluate(score(*value), Bounds::default(), at);
                if before != VerificationState::Reauth {
                    proptest::prop_assert!(m.state() >= classified, "{before} stayed below {classified} at {value}");
                }
            }
        }
    }
}
