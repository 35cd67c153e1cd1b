//! HTTP gateway for Vigil continuous verification sessions.
//!
//! Each session is fed by push providers: a client posts the latest face,
//! liveness and behaviour scores, and the session's scheduler polls them at
//! its own cadence.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use vigil_core::EngineConfig;

pub mod error;
pub mod push;
pub mod registry;
pub mod routes;

pub use error::GatewayError;
pub use routes::create_router;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<registry::SessionRegistry>,
    pub config: Arc<EngineConfig>,
    pub stale_after: Duration,
}

impl AppState {
    /// State with an empty registry; every session gets a copy of `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry::SessionRegistry::new()),
            config: Arc::new(config),
            stale_after: push::DEFAULT_STALE_AFTER,
        }
    }
}
