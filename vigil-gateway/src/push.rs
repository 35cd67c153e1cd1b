//! Push-fed modality providers.
//!
//! Clients post the latest readings over HTTP; the session's scheduler polls
//! them on its own cadence. A reading older than the staleness limit counts
//! as unavailable.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use vigil_core::{CoreError, ModalityKind, TrustScore, UserId};
use vigil_engine::{ModalityProvider, ProviderError, ProviderReading, ProviderSet, Reauthenticator};

/// Default age after which a pushed reading is ignored.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_millis(1_500);

/// Body of `POST /v1/sessions/{id}/scores`. Absent or `null` means unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreUpdate {
    #[serde(default)]
    pub face: Option<f64>,
    #[serde(default)]
    pub liveness: Option<f64>,
    #[serde(default)]
    pub behavior: Option<f64>,
}

impl ScoreUpdate {
    fn get(&self, kind: ModalityKind) -> Option<f64> {
        match kind {
            ModalityKind::Face => self.face,
            ModalityKind::Liveness => self.liveness,
            ModalityKind::Behavior => self.behavior,
        }
    }

    /// Reject any present value outside `[0, 1]`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidScore`] for the first bad value.
    pub fn validate(&self) -> Result<(), CoreError> {
        for kind in ModalityKind::ALL {
            if let Some(value) = self.get(kind) {
                TrustScore::new(value)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Pushed {
    update: ScoreUpdate,
    at: Instant,
}

/// Latest pushed readings for one session.
#[derive(Debug)]
pub struct ScoreSlot {
    latest: Mutex<Option<Pushed>>,
    stale_after: Duration,
}

impl ScoreSlot {
    #[must_use]
    pub fn new(stale_after: Duration) -> Self {
        Self { latest: Mutex::new(None), stale_after }
    }

    /// Store a validated update.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidScore`] and keeps the previous update if
    /// any value is out of range.
    pub fn push(&self, update: ScoreUpdate) -> Result<(), CoreError> {
        update.validate()?;
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Pushed { update, at: Instant::now() });
        Ok(())
    }

    /// Current reading for `kind`.
    #[must_use]
    pub fn reading(&self, kind: ModalityKind) -> ProviderReading {
        let latest = *self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest
            .filter(|pushed| pushed.at.elapsed() < self.stale_after)
            .and_then(|pushed| pushed.update.get(kind))
            .map_or_else(ProviderReading::unavailable, ProviderReading::available)
    }
}

/// One modality of a [`ScoreSlot`].
#[derive(Debug, Clone)]
pub struct PushedProvider {
    kind: ModalityKind,
    slot: Arc<ScoreSlot>,
}

impl PushedProvider {
    #[must_use]
    pub fn new(kind: ModalityKind, slot: Arc<ScoreSlot>) -> Self {
        Self { kind, slot }
    }

    /// Face, liveness and behaviour providers over one slot.
    ///
    /// # Errors
    /// Never fails in practice; propagates [`ProviderSet::new`]'s kind check.
    pub fn set(slot: &Arc<ScoreSlot>) -> Result<ProviderSet, vigil_engine::EngineError> {
        let provider = |kind| -> Arc<dyn ModalityProvider> { Arc::new(Self::new(kind, Arc::clone(slot))) };
        ProviderSet::new(
            provider(ModalityKind::Face),
            provider(ModalityKind::Liveness),
            provider(ModalityKind::Behavior),
        )
    }
}

#[async_trait]
impl ModalityProvider for PushedProvider {
    fn kind(&self) -> ModalityKind {
        self.kind
    }

    async fn score(&self) -> Result<ProviderReading, ProviderError> {
        Ok(self.slot.reading(self.kind))
    }
}

/// Outcome of an external re-authentication flow, as reported by the client.
#[derive(Debug, Clone, Copy)]
pub struct ReportedOutcome {
    pub success: bool,
}

#[async_trait]
impl Reauthenticator for ReportedOutcome {
    async fn reauthenticate(&self, user: &UserId) -> Result<bool, ProviderError> {
        tracing::info!(%user, success = self.success, "re-authentication outcome reported");
        Ok(self.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn readings_go_stale() {
        let slot = ScoreSlot::new(DEFAULT_STALE_AFTER);
        let update = ScoreUpdate { face: Some(0.9), liveness: None, behavior: Some(0.8) };
        if let Err(e) = slot.push(update) {
            panic!("valid update rejected: {e}");
        }
        assert_eq!(slot.reading(ModalityKind::Face), ProviderReading::available(0.9));
        assert!(!slot.reading(ModalityKind::Liveness).available, "absent means unavailable");
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(!slot.reading(ModalityKind::Face).available, "1.5s old reading must be stale");
    }

    #[test]
    fn out_of_range_update_keeps_previous() {
        let slot = ScoreSlot::new(Duration::from_secs(60));
        if let Err(e) = slot.push(ScoreUpdate { face: Some(0.5), ..ScoreUpdate::default() }) {
            panic!("valid update rejected: {e}");
        }
        let bad = ScoreUpdate { behavior: Some(-0.1), ..ScoreUpdate::default() };
        assert!(matches!(slot.push(bad), Err(CoreError::InvalidScore { .. })));
        assert_eq!(slot.reading(ModalityKind::Face), ProviderReading::available(0.5));
    }

    #[test]
    fn score_update_accepts_explicit_null() {
        let update: ScoreUpdate = match serde_json::from_str(r#"{"face": null, "behavior": 0.4}"#) {
            Ok(u) => u,
            Err(e) => panic!("body must parse: {e}"),
        };
        assert_eq!(update, ScoreUpdate { face: None, liveness: None, behavior: Some(0.4) });
    }
}
