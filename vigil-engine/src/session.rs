//! Verification session lifecycle.
//!
//! A [`VerificationSession`] owns one [`TrustEngine`], three providers and the
//! scheduler task that drives them. Each `start()` begins a new epoch; scores
//! and state changes from older epochs are never delivered to handlers.
//! `stopped` is emitted once per epoch and always delivered, even when a new
//! run has already started.
//!
//! All handlers registered with `on` run on one dispatcher task per session,
//! so they observe events in emission order.
//!
//! Locking: the lifecycle mutex is the emit lock. It is taken before the
//! engine mutex, never held across an `.await`, and every event is sent while
//! holding it, so `stop()` returning means nothing from the stopped run can
//! be emitted afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use vigil_core::{
    EngineConfig, EngineSnapshot, EnforcementPolicy, ModalityScore, SessionId, StateTransition,
    TrustEngine, TrustSample, TrustScore, UserId, VerificationState,
};

use crate::event::{EventKind, HandlerRegistry, SessionEvent, Subscription};
use crate::provider::{ProviderSet, Reauthenticator};
use crate::scheduler::Scheduler;
use crate::EngineError;

/// Counters for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct SessionStats {
    /// Ticks applied to the engine.
    pub ticks: u64,
    /// Ticks that came due while providers were still being polled.
    pub skipped_ticks: u64,
    /// Provider calls that failed, timed out or returned invalid values.
    pub provider_failures: u64,
}

/// Session-level view combining lifecycle and engine state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct SessionStatus {
    pub id: SessionId,
    pub user_id: Option<UserId>,
    pub running: bool,
    pub epoch: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub engine: EngineSnapshot,
    pub stats: SessionStats,
}

#[derive(Debug, Default)]
struct Lifecycle {
    running: bool,
    starting: bool,
    start_cancelled: bool,
    epoch: u64,
    cancel: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    user_id: Option<UserId>,
    started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    provider_failures: AtomicU64,
}

/// State shared between the session handle, the scheduler task and the
/// event dispatcher.
#[derive(Debug)]
pub(crate) struct Shared {
    lifecycle: Mutex<Lifecycle>,
    engine: Mutex<TrustEngine>,
    events: broadcast::Sender<SessionEvent>,
    counters: Counters,
    handlers: Arc<HandlerRegistry>,
}

impl Shared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn engine(&self) -> MutexGuard<'_, TrustEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one tick for `epoch` and emit its events.
    ///
    /// Returns `false` if the run is over and the scheduler should exit.
    pub(crate) fn apply_tick(&self, epoch: u64, readings: [ModalityScore; 3], at_ms: u64) -> bool {
        let lifecycle = self.lifecycle();
        if !lifecycle.running || lifecycle.epoch != epoch {
            return false;
        }
        let (outcome, policy) = {
            let mut engine = self.engine();
            let outcome = engine.tick(readings, at_ms);
            (outcome, engine.policy())
        };
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            epoch,
            at_ms,
            raw = %outcome.sample.raw_fused,
            smoothed = %outcome.sample.smoothed,
            confidence = outcome.sample.confidence,
            "tick"
        );
        let _ = self.events.send(SessionEvent::Scores { epoch, sample: outcome.sample });
        if let Some(transition) = outcome.transition {
            let _ = self.events.send(SessionEvent::StateChange { epoch, transition, policy });
        }
        drop(lifecycle);
        true
    }

    pub(crate) fn record_skipped(&self, count: u64) {
        self.counters.skipped_ticks.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_provider_failure(&self) {
        self.counters.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn deliverable(&self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::Error { .. } | SessionEvent::Stopped { .. } => true,
            _ => {
                let lifecycle = self.lifecycle();
                lifecycle.running && event.epoch() == lifecycle.epoch
            }
        }
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            skipped_ticks: self.counters.skipped_ticks.load(Ordering::Relaxed),
            provider_failures: self.counters.provider_failures.load(Ordering::Relaxed),
        }
    }

    fn reset_counters(&self) {
        self.counters.ticks.store(0, Ordering::Relaxed);
        self.counters.skipped_ticks.store(0, Ordering::Relaxed);
        self.counters.provider_failures.store(0, Ordering::Relaxed);
    }
}

/// Continuous verification for one logged-in user.
///
/// Construct with injected providers and configuration; drop on logout.
/// Dropping a running session stops it.
#[derive(Debug)]
pub struct VerificationSession {
    id: SessionId,
    config: EngineConfig,
    providers: ProviderSet,
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl VerificationSession {
    /// Create a stopped session.
    ///
    /// # Errors
    /// Returns [`EngineError::Core`] if `config` is invalid.
    pub fn new(config: EngineConfig, providers: ProviderSet) -> Result<Self, EngineError> {
        let engine = TrustEngine::new(config.clone())?;
        let (events, _) = broadcast::channel(config.scheduler.event_capacity);
        Ok(Self {
            id: SessionId::new(),
            config,
            providers,
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle::default()),
                engine: Mutex::new(engine),
                events,
                counters: Counters::default(),
                handlers: Arc::new(HandlerRegistry::default()),
            }),
            dispatcher: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Initialise providers and start the scheduler for `user_id`.
    ///
    /// Starts a new epoch with a fresh engine: `NORMAL`, full trust, empty
    /// history. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - [`EngineError::AlreadyRunning`] if running or already starting.
    /// - [`EngineError::ProviderInit`] if any provider fails to initialise; an
    ///   `error` event is emitted and no tick runs.
    /// - [`EngineError::StartCancelled`] if `stop()` was called meanwhile.
    pub async fn start(&self, user_id: UserId) -> Result<(), EngineError> {
        let (epoch, previous) = {
            let mut lifecycle = self.shared.lifecycle();
            if lifecycle.running || lifecycle.starting {
                return Err(EngineError::AlreadyRunning);
            }
            lifecycle.starting = true;
            lifecycle.start_cancelled = false;
            lifecycle.epoch += 1;
            lifecycle.user_id = Some(user_id.clone());
            lifecycle.started_at = None;
            (lifecycle.epoch, lifecycle.task.take())
        };

        // The previous loop exits promptly once cancelled; wait so its
        // provider shutdown cannot overlap this run's initialisation.
        if let Some(task) = previous {
            let _ = task.await;
        }

        self.shared.engine().reset();
        self.shared.reset_counters();

        if let Err(err) = self.providers.initialize_all().await {
            {
                let mut lifecycle = self.shared.lifecycle();
                lifecycle.starting = false;
                tracing::error!(session = %self.id, %user_id, epoch, error = %err, "session start failed");
                let _ = self.shared.events.send(SessionEvent::Error { epoch, message: err.to_string() });
            }
            self.providers.shutdown_all().await;
            return Err(err);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancelled = {
            let mut lifecycle = self.shared.lifecycle();
            lifecycle.starting = false;
            if lifecycle.start_cancelled {
                true
            } else {
                lifecycle.running = true;
                lifecycle.cancel = Some(cancel_tx);
                lifecycle.started_at = Some(Utc::now());
                let scheduler = Scheduler::new(
                    Arc::clone(&self.shared),
                    self.providers.clone(),
                    epoch,
                    &self.config.scheduler,
                );
                lifecycle.task = Some(tokio::spawn(scheduler.run(cancel_rx)));
                false
            }
        };
        if cancelled {
            self.providers.shutdown_all().await;
            return Err(EngineError::StartCancelled);
        }

        tracing::info!(
            session = %self.id,
            %user_id,
            epoch,
            frequency_hz = self.config.scheduler.frequency_hz,
            "verification session started"
        );
        Ok(())
    }

    /// Stop the scheduler.
    ///
    /// Idempotent, synchronous and safe to call from an `on` handler. Resets
    /// live engine state (history is kept until the next `start()`), emits
    /// `stopped` once, and guarantees no further event from this run is
    /// emitted.
    pub fn stop(&self) {
        let mut lifecycle = self.shared.lifecycle();
        if lifecycle.starting {
            lifecycle.start_cancelled = true;
        }
        if !lifecycle.running {
            return;
        }
        lifecycle.running = false;
        if let Some(cancel) = lifecycle.cancel.take() {
            let _ = cancel.send(true);
        }
        self.shared.engine().reset_live_state();
        let epoch = lifecycle.epoch;
        let _ = self.shared.events.send(SessionEvent::Stopped { epoch });
        tracing::info!(session = %self.id, epoch, "verification session stopped");
    }

    /// Register `handler` for one kind of event.
    ///
    /// Handlers run on the session's dispatcher task, never under a session
    /// lock, so they may call back into the session (including `stop()`).
    /// Every handler sees events in the order they were emitted, across
    /// kinds. Scores and state changes from an older epoch, or emitted after
    /// `stop()`, are dropped. Must be called from within a Tokio runtime.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.shared.handlers.insert(kind, Arc::new(handler));
        self.ensure_dispatcher();
        Subscription::new(&self.shared.handlers, id)
    }

    fn ensure_dispatcher(&self) {
        let mut dispatcher = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
        if dispatcher.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let mut rx = self.shared.events.subscribe();
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let handlers = Arc::clone(&self.shared.handlers);
        let session = self.id;
        *dispatcher = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let deliverable = match shared.upgrade() {
                            Some(shared) => shared.deliverable(&event),
                            None => matches!(event, SessionEvent::Stopped { .. } | SessionEvent::Error { .. }),
                        };
                        if !deliverable {
                            continue;
                        }
                        for (id, handler) in handlers.matching(event.kind()) {
                            handlers.call(id, &handler, &event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(%session, missed, "event dispatcher lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Raw event stream, including events from every epoch.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Run the external re-authentication flow and queue a successful outcome.
    ///
    /// Returns whether the outcome was accepted: `false` if the flow failed or
    /// the state does not require re-authentication.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] if stopped; [`EngineError::Reauth`] if the
    /// flow itself errored.
    pub async fn reauthenticate(&self, reauthenticator: &dyn Reauthenticator) -> Result<bool, EngineError> {
        let user_id = {
            let lifecycle = self.shared.lifecycle();
            match (&lifecycle.user_id, lifecycle.running) {
                (Some(user), true) => user.clone(),
                _ => return Err(EngineError::NotRunning),
            }
        };
        let succeeded = reauthenticator.reauthenticate(&user_id).await.map_err(EngineError::Reauth)?;
        if !succeeded {
            tracing::info!(session = %self.id, %user_id, "re-authentication rejected");
            return Ok(false);
        }
        self.report_reauth_success()
    }

    /// Queue a re-authentication that succeeded outside the session.
    ///
    /// Applied on the next tick. Returns `false` if the current state does not
    /// require re-authentication.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] if stopped.
    pub fn report_reauth_success(&self) -> Result<bool, EngineError> {
        let lifecycle = self.shared.lifecycle();
        if !lifecycle.running {
            return Err(EngineError::NotRunning);
        }
        let accepted = self.shared.engine().request_reauth();
        if accepted {
            tracing::info!(session = %self.id, epoch = lifecycle.epoch, "re-authentication queued");
        }
        Ok(accepted)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lifecycle().running
    }

    /// Epoch of the current (or most recent) run; `0` before the first start.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.shared.lifecycle().epoch
    }

    #[must_use]
    pub fn state(&self) -> VerificationState {
        self.shared.engine().state()
    }

    #[must_use]
    pub fn trust(&self) -> TrustScore {
        self.shared.engine().trust()
    }

    #[must_use]
    pub fn enforcement_policy(&self) -> EnforcementPolicy {
        self.shared.engine().policy()
    }

    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        self.shared.engine().snapshot()
    }

    /// Lifecycle, engine snapshot and counters in one consistent read.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let lifecycle = self.shared.lifecycle();
        SessionStatus {
            id: self.id,
            user_id: lifecycle.user_id.clone(),
            running: lifecycle.running,
            epoch: lifecycle.epoch,
            started_at: lifecycle.started_at,
            engine: self.shared.engine().snapshot(),
            stats: self.shared.stats(),
        }
    }

    /// Retained samples, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<TrustSample> {
        self.shared.engine().history()
    }

    /// Retained transitions, oldest first.
    #[must_use]
    pub fn transitions(&self) -> Vec<StateTransition> {
        self.shared.engine().transitions()
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.shared.stats()
    }
}

impl Drop for VerificationSession {
    fn drop(&mut self) {
        self.stop();
    }
}
