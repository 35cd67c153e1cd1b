//! Continuous verification sessions for the Vigil trust engine.
//!
//! Polls modality providers on a fixed cadence with single-flight semantics,
//! drives a [`vigil_core::TrustEngine`] one tick at a time, and reports scores
//! and state changes to subscribers.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod event;
pub mod provider;
mod scheduler;
pub mod session;

pub use error::{EngineError, ProviderError};
pub use event::{EventKind, SessionEvent, Subscription};
pub use provider::{ModalityProvider, ProviderReading, ProviderSet, Reauthenticator};
pub use session::{SessionStats, SessionStatus, VerificationSession};
