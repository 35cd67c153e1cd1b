//! Scripted providers, the pause-aware scenario clock and harness control.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use vigil_core::{ModalityKind, UserId};
use vigil_engine::{ModalityProvider, ProviderError, ProviderReading, Reauthenticator};

use crate::script::{segment_at, ScriptSegment};

#[derive(Debug, Default)]
struct ClockState {
    started: Option<Instant>,
    paused_total: Duration,
    paused_since: Option<Instant>,
}

/// Scenario time: elapsed time since the scenario started, minus pauses.
#[derive(Debug, Clone, Default)]
pub struct ScenarioClock {
    state: Arc<Mutex<ClockState>>,
}

impl ScenarioClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start counting from zero, forgetting earlier pauses.
    pub fn restart(&self) {
        *self.lock() = ClockState { started: Some(Instant::now()), ..ClockState::default() };
    }

    pub fn pause(&self) {
        let mut state = self.lock();
        if state.started.is_some() && state.paused_since.is_none() {
            state.paused_since = Some(Instant::now());
        }
    }

    pub fn resume(&self) {
        let mut state = self.lock();
        if let Some(since) = state.paused_since.take() {
            state.paused_total += since.elapsed();
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().paused_since.is_some()
    }

    /// Scenario milliseconds; frozen while paused, `0` before the first start.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        let state = self.lock();
        let Some(started) = state.started else { return 0 };
        let now = state.paused_since.unwrap_or_else(Instant::now);
        millis(now.saturating_duration_since(started).saturating_sub(state.paused_total))
    }

    /// Total time spent paused in completed pauses.
    #[must_use]
    pub fn paused_total_ms(&self) -> u64 {
        millis(self.lock().paused_total)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Script segments shared by the three scripted providers.
#[derive(Debug, Clone)]
pub struct ScenarioFeed {
    clock: ScenarioClock,
    segments: Arc<RwLock<Vec<ScriptSegment>>>,
}

impl ScenarioFeed {
    #[must_use]
    pub fn new(clock: ScenarioClock) -> Self {
        Self { clock, segments: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Replace the script the providers read from.
    pub fn load(&self, segments: Vec<ScriptSegment>) {
        *self.segments.write().unwrap_or_else(PoisonError::into_inner) = segments;
    }

    pub fn clear(&self) {
        self.load(Vec::new());
    }

    /// Reading for `kind` at the current scenario time.
    #[must_use]
    pub fn reading(&self, kind: ModalityKind) -> ProviderReading {
        let offset = self.clock.elapsed_ms();
        let segments = self.segments.read().unwrap_or_else(PoisonError::into_inner);
        segment_at(&segments, offset)
            .and_then(|segment| segment.value(kind))
            .map_or_else(ProviderReading::unavailable, ProviderReading::available)
    }
}

/// Provider that replays one modality of a [`ScenarioFeed`].
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    kind: ModalityKind,
    feed: ScenarioFeed,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(kind: ModalityKind, feed: ScenarioFeed) -> Self {
        Self { kind, feed }
    }
}

#[async_trait]
impl ModalityProvider for ScriptedProvider {
    fn kind(&self) -> ModalityKind {
        self.kind
    }

    async fn score(&self) -> Result<ProviderReading, ProviderError> {
        Ok(self.feed.reading(self.kind))
    }
}

/// Re-authenticator with a fixed outcome.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedReauthenticator {
    succeeds: bool,
}

impl ScriptedReauthenticator {
    #[must_use]
    pub fn new(succeeds: bool) -> Self {
        Self { succeeds }
    }
}

#[async_trait]
impl Reauthenticator for ScriptedReauthenticator {
    async fn reauthenticate(&self, user: &UserId) -> Result<bool, ProviderError> {
        tracing::debug!(%user, succeeds = self.succeeds, "scripted re-authentication");
        Ok(self.succeeds)
    }
}

/// Harness run mode, independent of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Running,
    Paused,
    Stopped,
}

/// Cloneable handle for pausing, resuming or stopping a harness run.
#[derive(Debug, Clone)]
pub struct HarnessControl {
    mode: Arc<watch::Sender<RunMode>>,
    clock: ScenarioClock,
}

impl HarnessControl {
    #[must_use]
    pub fn new(clock: ScenarioClock) -> Self {
        let (mode, _) = watch::channel(RunMode::Running);
        Self { mode: Arc::new(mode), clock }
    }

    /// Freeze the scenario clock and suspend sample recording.
    ///
    /// The session keeps ticking; a state change while paused is recorded at
    /// the scenario time the pause began.
    pub fn pause(&self) {
        let paused = self.mode.send_if_modified(|mode| {
            let was_running = *mode == RunMode::Running;
            if was_running {
                *mode = RunMode::Paused;
            }
            was_running
        });
        if paused {
            self.clock.pause();
            tracing::info!("harness paused");
        }
    }

    /// Restart the scenario clock, then resume recording.
    pub fn resume(&self) {
        if self.mode() != RunMode::Paused {
            return;
        }
        self.clock.resume();
        let resumed = self.mode.send_if_modified(|mode| {
            let was_paused = *mode == RunMode::Paused;
            if was_paused {
                *mode = RunMode::Running;
            }
            was_paused
        });
        if resumed {
            tracing::info!("harness resumed");
        }
    }

    /// Abort the current scenario and skip the rest of the suite.
    pub fn stop(&self) {
        self.clock.resume();
        self.mode.send_replace(RunMode::Stopped);
        tracing::info!("harness stop requested");
    }

    #[must_use]
    pub fn mode(&self) -> RunMode {
        *self.mode.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<RunMode> {
        self.mode.subscribe()
    }

    pub(crate) fn reset(&self) {
        self.clock.resume();
        self.mode.send_replace(RunMode::Running);
    }
}
