//! # Stepfuzz
//!
//! A harness that lets a fuzzing engine feed untrusted inputs to the stepfuzz interpreter without
//! any single input hanging the process, growing without bound, or leaking state into the next
//! one.
//!
//! Every input runs as one request under a fixed step budget and size ceiling. Exceeding either
//! aborts the request: control returns to the driver, the interpreter's own shutdown still runs
//! once, and the next input starts from a clean slate.
//!
//! ## Fuzz targets
//!
//! A fuzz target calls [`setup()`](fn.setup.html) once, then [`run_one()`](fn.run_one.html) per
//! input:
//!
//! ```no_run
//! stepfuzz_runtime::setup().expect("harness setup");
//! let status = stepfuzz_runtime::run_one(b"while (true) {}");
//! assert_eq!(status, stepfuzz_runtime::RunStatus::Aborted);
//! ```
//!
//! Limits default to 1000 steps and 8 KiB, and can be overridden with the `STEPFUZZ_MAX_STEPS`
//! and `STEPFUZZ_MAX_SIZE` environment variables. Programs that need several differently
//! configured harnesses can build [`Harness`](struct.Harness.html)es directly.

#![deny(bare_trait_objects)]

use std::cell::RefCell;

pub use stepfuzz_runtime_internals::context::{Counters, HarnessCtx};
pub use stepfuzz_runtime_internals::error::Error;
pub use stepfuzz_runtime_internals::governor::StepGovernor;
pub use stepfuzz_runtime_internals::guard::SizeCeiling;
pub use stepfuzz_runtime_internals::harness::{
    self, Harness, HarnessBuilder, RunReport, RunStatus, State, FUZZER_REQUEST_PATH,
};
pub use stepfuzz_runtime_internals::limits::{self, Limits};
pub use stepfuzz_runtime_internals::termination::{GuardSite, TerminationDetails};
pub use stepfuzz_runtime_internals::{interceptor, signals};
pub use stepfuzz_vm as vm;

thread_local! {
    static HARNESS: RefCell<Option<Harness>> = RefCell::new(None);
}

/// Set up the harness for this thread from the environment.
///
/// Must be called once before [`run_one()`](fn.run_one.html).
pub fn setup() -> Result<(), Error> {
    let builder = Harness::builder()
        .limits(Limits::from_env()?)
        .env_config(vm::EnvConfig::from_env()?);
    setup_with(builder)
}

/// Set up the harness for this thread from a configured builder.
pub fn setup_with(builder: HarnessBuilder) -> Result<(), Error> {
    HARNESS.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(Error::AlreadySetUp);
        }
        *slot = Some(builder.build()?);
        Ok(())
    })
}

/// Run one input through the harness set up on this thread.
///
/// # Panics
///
/// Panics if [`setup()`](fn.setup.html) has not been called on this thread.
pub fn run_one(input: &[u8]) -> RunStatus {
    with_harness(|harness| harness.run_one(input))
}

/// Borrow the harness set up on this thread, for example to read the last run's report.
///
/// # Panics
///
/// Panics if [`setup()`](fn.setup.html) has not been called on this thread.
pub fn with_harness<F, R>(f: F) -> R
where
    F: FnOnce(&mut Harness) -> R,
{
    HARNESS.with(|slot| {
        let mut slot = slot.borrow_mut();
        let harness = slot
            .as_mut()
            .expect("stepfuzz_runtime::setup() must be called before running inputs");
        f(harness)
    })
}
