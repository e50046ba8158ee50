//! Execute fuzz target: run every input as a script under the step budget and size ceiling.
//!
//! Crashes found here are interpreter defects. Hangs and runaway growth are cut off by the
//! harness, so they never reach the fuzzer as timeouts or out-of-memory reports.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::Once;

static SETUP: Once = Once::new();

fuzz_target!(|data: &[u8]| {
    SETUP.call_once(|| {
        let _ = env_logger::try_init();
        stepfuzz_runtime::setup().expect("harness setup");
    });
    stepfuzz_runtime::run_one(data);
});
