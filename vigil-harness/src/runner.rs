//! Scenario runner.
//!
//! One [`VerificationSession`] serves a whole suite. Each scenario stops it,
//! reloads the scripted feed, restarts it in a fresh epoch and records the
//! trajectory from the event stream until the scenario clock reaches the
//! scenario's duration.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use vigil_core::{EngineConfig, ModalityKind, StateTransition, TrustSample, UserId};
use vigil_engine::{ModalityProvider, ProviderSet, SessionEvent, VerificationSession};

use crate::report::{RunStatus, ScenarioResult, SecurityReport};
use crate::script::{ScenarioInput, ScenarioScript};
use crate::synthetic::{HarnessControl, RunMode, ScenarioClock, ScenarioFeed, ScriptedProvider, ScriptedReauthenticator};
use crate::HarnessError;

const HARNESS_USER: &str = "scenario-harness";

/// Ticks without any event before a scenario counts as stalled.
const STALL_TICKS: u32 = 8;

/// Drives scenarios through a verification session and scores them.
#[derive(Debug)]
pub struct HarnessRunner {
    session: VerificationSession,
    feed: Option<ScenarioFeed>,
    clock: ScenarioClock,
    control: HarnessControl,
    user: UserId,
}

/// What the event loop collected for one scenario.
#[derive(Debug, Default)]
struct Recording {
    samples: Vec<TrustSample>,
    transitions: Vec<StateTransition>,
    last_recorded_ms: Option<u64>,
    recording_tick: bool,
    reauth_sent: bool,
}

impl HarnessRunner {
    /// A runner whose session reads from scripted providers.
    ///
    /// # Errors
    /// Returns an engine error if `config` is invalid.
    pub fn scripted(config: EngineConfig) -> Result<Self, HarnessError> {
        let clock = ScenarioClock::new();
        let feed = ScenarioFeed::new(clock.clone());
        let provider = |kind| -> Arc<dyn ModalityProvider> { Arc::new(ScriptedProvider::new(kind, feed.clone())) };
        let providers = ProviderSet::new(
            provider(ModalityKind::Face),
            provider(ModalityKind::Liveness),
            provider(ModalityKind::Behavior),
        )?;
        let session = VerificationSession::new(config, providers)?;
        Ok(Self::build(session, Some(feed), clock))
    }

    /// A runner around a caller-built session with real providers.
    ///
    /// Only [`ScenarioInput::Live`] scenarios can run on it.
    #[must_use]
    pub fn live(session: VerificationSession) -> Self {
        Self::build(session, None, ScenarioClock::new())
    }

    fn build(session: VerificationSession, feed: Option<ScenarioFeed>, clock: ScenarioClock) -> Self {
        Self { session, feed, control: HarnessControl::new(clock.clone()), clock, user: UserId::new(HARNESS_USER) }
    }

    /// Handle for pausing, resuming or stopping runs from another task.
    #[must_use]
    pub fn control(&self) -> HarnessControl {
        self.control.clone()
    }

    #[must_use]
    pub fn session(&self) -> &VerificationSession {
        &self.session
    }

    /// Run every script in order and score the results.
    ///
    /// Stopping through [`HarnessControl::stop`] aborts the current scenario
    /// and skips the rest; the report then covers what ran.
    ///
    /// # Errors
    /// Returns the first scenario error.
    pub async fn run_suite(&self, scripts: &[ScenarioScript]) -> Result<SecurityReport, HarnessError> {
        self.control.reset();
        let mut results = Vec::with_capacity(scripts.len());
        let mut aborted = false;
        for script in scripts {
            if self.control.mode() == RunMode::Stopped {
                aborted = true;
                break;
            }
            let result = self.run_scenario(script).await?;
            if result.status == RunStatus::Aborted {
                aborted = true;
                results.push(result);
                break;
            }
            results.push(result);
        }
        let report = SecurityReport::from_results(results, aborted);
        tracing::info!(
            scenarios = report.results.len(),
            passed = report.passed(),
            grade = %report.grade,
            f1 = report.f1,
            aborted,
            "scenario suite finished"
        );
        Ok(report)
    }

    /// Run one scenario in a fresh session epoch.
    ///
    /// # Errors
    /// - [`HarnessError::InvalidScript`] if the script does not validate.
    /// - [`HarnessError::InputMismatch`] if the input kind does not match the runner.
    /// - [`HarnessError::Session`] if the session emits an error event.
    /// - [`HarnessError::Stalled`] if the session stops producing events.
    /// - [`HarnessError::Engine`] if the session cannot start.
    pub async fn run_scenario(&self, script: &ScenarioScript) -> Result<ScenarioResult, HarnessError> {
        script.validate()?;
        let duration_ms = script.duration_ms();
        if self.control.mode() == RunMode::Stopped {
            return Ok(ScenarioResult::new(
                script.name.clone(),
                script.expected_state,
                RunStatus::Aborted,
                duration_ms,
                Vec::new(),
                Vec::new(),
            ));
        }

        self.session.stop();
        self.load_input(script)?;
        let mut events = self.session.subscribe();
        self.clock.restart();
        if self.control.mode() == RunMode::Paused {
            self.clock.pause();
        }
        self.session.start(self.user.clone()).await?;
        let epoch = self.session.epoch();
        tracing::info!(scenario = %script.name, epoch, duration_ms, "scenario started");

        let mut mode = self.control.watch();
        let stall_after = self.session.config().scheduler.period() * STALL_TICKS
            + self.session.config().scheduler.provider_timeout();
        let started = Instant::now();
        let mut rec = Recording::default();

        let status = loop {
            let event = tokio::select! {
                biased;
                changed = mode.changed() => {
                    if changed.is_err() || *mode.borrow_and_update() == RunMode::Stopped {
                        break RunStatus::Aborted;
                    }
                    continue;
                }
                event = tokio::time::timeout(stall_after, events.recv()) => event,
            };
            let event = match event {
                Ok(Ok(event)) => event,
                Ok(Err(RecvError::Lagged(missed))) => {
                    tracing::warn!(scenario = %script.name, missed, "harness lagged behind session events");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => break RunStatus::Aborted,
                Err(_) => {
                    self.session.stop();
                    return Err(HarnessError::Stalled {
                        name: script.name.clone(),
                        waited_ms: u64::try_from(stall_after.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            };
            if event.epoch() != epoch {
                continue;
            }
            if self.control.mode() == RunMode::Paused {
                rec.recording_tick = false;
                // Samples pause with the clock; state changes are always kept.
                if let SessionEvent::StateChange { mut transition, .. } = event {
                    transition.at_ms = self.clock.elapsed_ms().max(rec.last_recorded_ms.unwrap_or(0));
                    rec.transitions.push(transition);
                }
                continue;
            }
            let paused_ms = self.clock.paused_total_ms();
            match event {
                SessionEvent::Scores { mut sample, .. } => {
                    let scenario_ms = sample.at_ms.saturating_sub(paused_ms);
                    if scenario_ms >= duration_ms {
                        break RunStatus::Completed;
                    }
                    rec.recording_tick = rec.last_recorded_ms.is_none_or(|last| scenario_ms > last);
                    if !rec.recording_tick {
                        continue;
                    }
                    rec.last_recorded_ms = Some(scenario_ms);
                    shift_sample(&mut sample, paused_ms);
                    rec.samples.push(sample);
                    self.maybe_reauthenticate(script, scenario_ms, &mut rec).await?;
                }
                SessionEvent::StateChange { mut transition, .. } => {
                    transition.at_ms = if rec.recording_tick {
                        transition.at_ms.saturating_sub(paused_ms)
                    } else {
                        rec.last_recorded_ms.unwrap_or(0)
                    };
                    rec.transitions.push(transition);
                }
                SessionEvent::Error { message, .. } => {
                    self.session.stop();
                    return Err(HarnessError::Session { name: script.name.clone(), message });
                }
                SessionEvent::Stopped { .. } => break RunStatus::Aborted,
                _ => {}
            }
        };
        self.session.stop();

        let result = ScenarioResult::new(
            script.name.clone(),
            script.expected_state,
            status,
            duration_ms,
            rec.transitions,
            rec.samples,
        );
        tracing::info!(
            scenario = %result.scenario,
            status = result.status.as_str(),
            expected = %result.expected_state,
            actual = %result.final_state,
            success = result.success,
            transitions = result.transitions.len(),
            wall_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "scenario finished"
        );
        Ok(result)
    }

    fn load_input(&self, script: &ScenarioScript) -> Result<(), HarnessError> {
        let mismatch = |needed, available| HarnessError::InputMismatch { name: script.name.clone(), needed, available };
        match (&script.input, &self.feed) {
            (ScenarioInput::Scripted { segments, .. }, Some(feed)) => {
                feed.load(segments.clone());
                Ok(())
            }
            (ScenarioInput::Live, None) => Ok(()),
            (ScenarioInput::Scripted { .. }, None) => Err(mismatch("scripted", "live")),
            (ScenarioInput::Live, Some(_)) => Err(mismatch("live", "scripted")),
        }
    }

    async fn maybe_reauthenticate(
        &self,
        script: &ScenarioScript,
        scenario_ms: u64,
        rec: &mut Recording,
    ) -> Result<(), HarnessError> {
        let Some(reauth) = script.scripted_reauth() else { return Ok(()) };
        if rec.reauth_sent || scenario_ms < reauth.at_ms {
            return Ok(());
        }
        rec.reauth_sent = true;
        let accepted = self.session.reauthenticate(&ScriptedReauthenticator::new(reauth.succeeds)).await?;
        tracing::info!(scenario = %script.name, scenario_ms, succeeds = reauth.succeeds, accepted, "scripted re-authentication");
        Ok(())
    }
}

/// Move a session-time sample onto the scenario clock.
fn shift_sample(sample: &mut TrustSample, paused_ms: u64) {
    sample.at_ms = sample.at_ms.saturating_sub(paused_ms);
    for score in [&mut sample.face, &mut sample.liveness, &mut sample.behavior] {
        score.at_ms = score.at_ms.saturating_sub(paused_ms);
    }
}

#[cfg(test)]
mod tests {
    use vigil_core::VerificationState;

    use super::*;
    use crate::script::ScriptSegment;

    fn runner() -> HarnessRunner {
        match HarnessRunner::scripted(EngineConfig::default()) {
            Ok(r) => r,
            Err(e) => panic!("default config must build a runner: {e}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn live_script_on_scripted_runner_is_rejected() {
        let script = ScenarioScript::live("camera", "", 5, VerificationState::Normal);
        match runner().run_scenario(&script).await {
            Err(HarnessError::InputMismatch { needed, available, .. }) => {
                assert_eq!((needed, available), ("live", "scripted"));
            }
            other => panic!("expected InputMismatch, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_script_never_starts_the_session() {
        let runner = runner();
        let script = ScenarioScript::scripted("empty", "", 5, VerificationState::Normal, Vec::new());
        assert!(matches!(runner.run_scenario(&script).await, Err(HarnessError::InvalidScript { .. })));
        assert_eq!(runner.session().epoch(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn samples_stop_short_of_the_duration() {
        let runner = runner();
        let script = ScenarioScript::scripted(
            "short",
            "",
            2,
            VerificationState::Normal,
            vec![ScriptSegment::steady(2_000, 0.95, 0.9, 0.9)],
        );
        let result = match runner.run_scenario(&script).await {
            Ok(r) => r,
            Err(e) => panic!("scenario failed: {e}"),
        };
        let offsets: Vec<_> = result.trust_history.iter().map(|s| s.at_ms).collect();
        assert_eq!(offsets, vec![0, 500, 1_000, 1_500]);
        assert!(result.success);
        assert!(!runner.session().is_running(), "session must be stopped after a scenario");
    }

    #[test]
    fn shift_sample_moves_every_timestamp() {
        let mut engine = match vigil_core::TrustEngine::new(EngineConfig::default()) {
            Ok(e) => e,
            Err(e) => panic!("default config must be valid: {e}"),
        };
        let at = 7_000;
        let readings = ModalityKind::ALL
            .map(|kind| vigil_core::ModalityScore::observed(kind, vigil_core::TrustScore::MAX, at));
        let mut sample = engine.tick(readings, at).sample;
        shift_sample(&mut sample, 2_000);
        assert_eq!(sample.at_ms, 5_000);
        assert_eq!(sample.face.at_ms, 5_000);
        assert_eq!(sample.behavior.at_ms, 5_000);
    }
}
