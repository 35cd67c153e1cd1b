//! Fixed-cadence verification loop.
//!
//! One task per run. Each tick polls the three providers concurrently, waits
//! for all of them (bounded by the provider timeout), then applies the tick.
//! Ticks that come due while a poll is outstanding are skipped, never queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use vigil_core::{ModalityScore, SchedulerConfig};

use crate::provider::{ModalityProvider, ProviderSet};
use crate::session::Shared;

pub(crate) struct Scheduler {
    shared: Arc<Shared>,
    providers: ProviderSet,
    epoch: u64,
    period: Duration,
    provider_timeout: Duration,
}

impl Scheduler {
    pub(crate) fn new(
        shared: Arc<Shared>,
        providers: ProviderSet,
        epoch: u64,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            shared,
            providers,
            epoch,
            period: config.period(),
            provider_timeout: config.provider_timeout(),
        }
    }

    /// Tick until `cancel` flips or the run is no longer current.
    ///
    /// Tick `n` is due at `origin + n * period`. After a poll the loop jumps to
    /// the first boundary at or after the current time, so a tick that fell
    /// inside an overrunning poll is counted as skipped and never runs late.
    pub(crate) async fn run(self, mut cancel: watch::Receiver<bool>) {
        let origin = Instant::now();
        let mut index: u64 = 0;

        loop {
            if *cancel.borrow() {
                break;
            }
            let offset = tick_offset(index, self.period);
            let Some(deadline) = origin.checked_add(offset) else {
                break;
            };
            tokio::select! {
                biased;
                _ = cancel.changed() => break,
                () = tokio::time::sleep_until(deadline) => {}
            }

            let at_ms = u64::try_from(offset.as_millis()).unwrap_or(u64::MAX);
            let readings = tokio::select! {
                biased;
                _ = cancel.changed() => break,
                readings = self.poll_all(at_ms) => readings,
            };

            if !self.shared.apply_tick(self.epoch, readings, at_ms) {
                break;
            }

            let elapsed = Instant::now().saturating_duration_since(origin);
            let next = next_tick_index(elapsed, self.period).max(index + 1);
            let skipped = next - index - 1;
            if skipped > 0 {
                tracing::debug!(epoch = self.epoch, skipped, "provider poll overran tick period");
                self.shared.record_skipped(skipped);
            }
            index = next;
        }

        self.providers.shutdown_all().await;
        tracing::debug!(epoch = self.epoch, "scheduler loop exited");
    }

    async fn poll_all(&self, at_ms: u64) -> [ModalityScore; 3] {
        let [face, liveness, behavior] = self.providers.all();
        let (face, liveness, behavior) = tokio::join!(
            self.poll(face.as_ref(), at_ms),
            self.poll(liveness.as_ref(), at_ms),
            self.poll(behavior.as_ref(), at_ms),
        );
        [face, liveness, behavior]
    }

    async fn poll(&self, provider: &dyn ModalityProvider, at_ms: u64) -> ModalityScore {
        let kind = provider.kind();
        let failure = match tokio::time::timeout(self.provider_timeout, provider.score()).await {
            Ok(Ok(reading)) => {
                match ModalityScore::from_reading(kind, reading.value, reading.available, at_ms) {
                    Ok(score) => return score,
                    Err(err) => err.to_string(),
                }
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("no reading within {}ms", self.provider_timeout.as_millis()),
        };
        tracing::warn!(epoch = self.epoch, %kind, at_ms, reason = %failure, "modality unavailable this tick");
        self.shared.record_provider_failure();
        ModalityScore::unavailable(kind, at_ms)
    }
}

/// Offset of tick `index` from the loop origin.
fn tick_offset(index: u64, period: Duration) -> Duration {
    let nanos = period.as_nanos().saturating_mul(u128::from(index));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Index of the first tick due at or after `elapsed`.
fn next_tick_index(elapsed: Duration, period: Duration) -> u64 {
    let period = period.as_nanos().max(1);
    u64::try_from(elapsed.as_nanos().div_ceil(period)).unwrap_or(u64::MAX)
}
