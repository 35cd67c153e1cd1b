//! Core types and trust logic for the Vigil continuous verification engine.
//!
//! Everything here is synchronous and free of I/O: modality scores go in,
//! fused and smoothed trust, state transitions and enforcement policy come
//! out. The async scheduler lives in `vigil-engine`.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod history;
pub mod id;
pub mod machine;
pub mod policy;
pub mod recovery;
pub mod smoothing;
pub mod state;
pub mod tamper;
pub mod trust;

pub use config::{
    EngineConfig, FusionWeights, HysteresisConfig, RecoveryConfig, SchedulerConfig, SmoothingConfig,
    TamperConfig, Thresholds,
};
pub use engine::{EngineSnapshot, TickOutcome, TrustEngine};
pub use error::CoreError;
pub use fusion::{FusionEngine, Fused, ModalityHold};
pub use history::RingBuffer;
pub use id::{SessionId, UserId};
pub use machine::{Bounds, TrustStateMachine};
pub use policy::{policy, BlockedAction, EnforcementPolicy};
pub use recovery::{RecoveryEvent, RecoveryMonitor, RecoveryState};
pub use smoothing::{smooth, TrustSmoother};
pub use state::{state_info, StateInfo, StateTransition, TransitionReason, VerificationState};
pub use tamper::{TamperMonitor, TamperStatus};
pub use trust::{ModalityKind, ModalityScore, TrustSample, TrustScore};
