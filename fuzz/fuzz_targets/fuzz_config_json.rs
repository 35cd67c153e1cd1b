//! Fuzz target: `EngineConfig` JSON parsing and validation.
//!
//! Arbitrary bytes must be rejected with an error, never a panic, and any
//! accepted configuration must build an engine.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_core::{EngineConfig, TrustEngine};

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else { return };
    if let Ok(config) = EngineConfig::from_json_str(json) {
        assert!(TrustEngine::new(config).is_ok(), "validated config must build an engine");
    }
});
