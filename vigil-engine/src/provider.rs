//! Modality provider and re-authentication abstractions.
//!
//! Providers wrap whatever produces scores (a camera pipeline, a liveness
//! model, a behavioural analyser, a scripted feed) without the scheduler
//! knowing which.

use std::sync::Arc;

use async_trait::async_trait;
use vigil_core::{ModalityKind, UserId};

use crate::{EngineError, ProviderError};

/// One raw answer from a provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderReading {
    /// Score in `[0, 1]`; ignored when `available` is false.
    pub value: f64,
    /// Whether the provider had a signal this tick.
    pub available: bool,
}

impl ProviderReading {
    #[must_use]
    pub fn available(value: f64) -> Self {
        Self { value, available: true }
    }

    #[must_use]
    pub fn unavailable() -> Self {
        Self { value: 0.0, available: false }
    }
}

/// Source of one modality's scores.
///
/// Implementations must be `Send + Sync`; the scheduler polls all three
/// providers concurrently from its own task.
///
/// # Cancel Safety
/// `score()` must be cancel safe. The scheduler drops the future when the
/// provider timeout elapses or the session stops.
#[async_trait]
pub trait ModalityProvider: Send + Sync {
    /// Which modality this provider scores.
    fn kind(&self) -> ModalityKind;

    /// Prepare the provider (open a camera, load a model).
    ///
    /// # Errors
    /// Any error aborts `start()` with [`EngineError::ProviderInit`].
    async fn initialize(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Produce the current reading.
    ///
    /// # Errors
    /// An error makes the modality unavailable for this tick only.
    async fn score(&self) -> Result<ProviderReading, ProviderError>;

    /// Release resources after the session stops.
    async fn shutdown(&self) {}
}

/// External re-authentication flow (password, passkey, face re-enrolment).
#[async_trait]
pub trait Reauthenticator: Send + Sync {
    /// Run the flow for `user` and report whether it succeeded.
    ///
    /// # Errors
    /// Returns [`ProviderError::Reauth`] if the flow could not run at all.
    async fn reauthenticate(&self, user: &UserId) -> Result<bool, ProviderError>;
}

/// The three providers a session polls, checked to be in the right slots.
#[derive(Clone)]
pub struct ProviderSet {
    face: Arc<dyn ModalityProvider>,
    liveness: Arc<dyn ModalityProvider>,
    behavior: Arc<dyn ModalityProvider>,
}

impl ProviderSet {
    /// Bundle three providers.
    ///
    /// # Errors
    /// Returns [`EngineError::ProviderMismatch`] if a provider reports a
    /// different modality than its slot.
    pub fn new(
        face: Arc<dyn ModalityProvider>,
        liveness: Arc<dyn ModalityProvider>,
        behavior: Arc<dyn ModalityProvider>,
    ) -> Result<Self, EngineError> {
        for (expected, provider) in ModalityKind::ALL.into_iter().zip([&face, &liveness, &behavior]) {
            let actual = provider.kind();
            if actual != expected {
                return Err(EngineError::ProviderMismatch { expected, actual });
            }
        }
        Ok(Self { face, liveness, behavior })
    }

    /// Providers in [`ModalityKind::ALL`] order.
    #[must_use]
    pub fn all(&self) -> [&Arc<dyn ModalityProvider>; 3] {
        [&self.face, &self.liveness, &self.behavior]
    }

    pub(crate) async fn initialize_all(&self) -> Result<(), EngineError> {
        for provider in self.all() {
            provider
                .initialize()
                .await
                .map_err(|source| EngineError::ProviderInit { kind: provider.kind(), source })?;
        }
        Ok(())
    }

    pub(crate) async fn shutdown_all(&self) {
        for provider in self.all() {
            provider.shutdown().await;
        }
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet").finish_non_exhaustive()
    }
}
