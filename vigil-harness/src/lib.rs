//! Scenario harness and security evaluation for the Vigil trust engine.
//!
//! Replays scripted modality sequences through a real
//! [`vigil_engine::VerificationSession`], records each trajectory, and scores
//! a suite with a confusion matrix and letter grade. Results export to JSON
//! and CSV.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod export;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod script;
pub mod synthetic;

pub use error::HarnessError;
pub use export::{export_report, to_csv, to_json, trajectory_csv};
pub use report::{ConfusionMatrix, Grade, RunStatus, ScenarioResult, SecurityReport, TrajectoryDigest};
pub use runner::HarnessRunner;
pub use scenarios::canonical_suite;
pub use script::{segment_at, ScenarioInput, ScenarioScript, ScriptSegment, ScriptedReauth};
pub use synthetic::{HarnessControl, RunMode, ScenarioClock, ScenarioFeed, ScriptedProvider, ScriptedReauthenticator};
