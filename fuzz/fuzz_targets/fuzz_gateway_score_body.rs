//! Fuzz target: JSON bodies for `POST /v1/sessions/{id}/scores`.
//!
//! Parsing and validation must never panic; a body that validates must
//! only carry values in `[0, 1]`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_gateway::push::ScoreUpdate;

fuzz_target!(|data: &[u8]| {
    let Ok(update) = serde_json::from_slice::<ScoreUpdate>(data) else { return };
    if update.validate().is_ok() {
        for value in [update.face, update.liveness, update.behavior].into_iter().flatten() {
            assert!((0.0..=1.0).contains(&value), "validated score {value} out of range");
        }
    }
});
