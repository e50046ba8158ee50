use lazy_static::lazy_static;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::RwLock;
use stepfuzz_runtime::vm::{NativeFunction, Value};
use stepfuzz_runtime::{Harness, HarnessBuilder, HarnessCtx, RunReport};

lazy_static! {
    static ref EXCLUSIVE_TEST: RwLock<()> = RwLock::default();
}

/// Run a test non-exclusively with other `test_nonex` tests.
///
/// This function _must_ wrap any test that sets up a harness without `keep_sigpipe()`.
#[allow(dead_code)]
pub fn test_nonex<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let lock = EXCLUSIVE_TEST.read().unwrap();
    let r = f();
    drop(lock);
    r
}

/// Run a test exclusively, so that no other `test_nonex` or `test_ex` tests will run concurrently.
///
/// This function _must_ wrap any test that inspects or changes a signal disposition.
#[allow(dead_code)]
pub fn test_ex<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let lock = EXCLUSIVE_TEST.write().unwrap();
    let r = f();
    drop(lock);
    r
}

/// What the probe natives saw.
#[derive(Default)]
pub struct Probes {
    /// Steps remaining each time `probe()` ran.
    pub remaining: RefCell<Vec<u32>>,
    /// Times the body of `sink()` ran.
    pub sink_calls: Cell<usize>,
}

/// A default harness with two extra natives:
///
/// * `probe()` records how many steps are left in the budget.
/// * `sink(s)` counts how often its body runs and returns `strlen(s)`.
#[allow(dead_code)]
pub fn probed_harness() -> (Harness, Rc<Probes>) {
    probed_harness_from(Harness::builder())
}

#[allow(dead_code)]
pub fn probed_harness_from(builder: HarnessBuilder) -> (Harness, Rc<Probes>) {
    let probes = Rc::new(Probes::default());
    let ctx: Rc<HarnessCtx> = builder.context();

    let seen = probes.clone();
    let probe = NativeFunction::new("probe", 0, Some(0), move |_, _| {
        seen.remaining.borrow_mut().push(ctx.governor().remaining());
        Ok(Value::Null)
    });
    let seen = probes.clone();
    let sink = NativeFunction::new("sink", 1, Some(1), move |_, args| {
        seen.sink_calls.set(seen.sink_calls.get() + 1);
        Ok(Value::Int(args[0].to_display_string().len() as i64))
    });

    let harness = builder
        .keep_sigpipe()
        .with_native(probe)
        .with_native(sink)
        .build()
        .expect("harness builds");
    (harness, probes)
}

/// Run `src` and hand back the report it left.
#[allow(dead_code)]
pub fn run<'a>(harness: &'a mut Harness, src: &str) -> &'a RunReport {
    harness.run_one(src.as_bytes());
    harness.last_run().expect("a run leaves a report")
}

#[allow(dead_code)]
pub fn output(report: &RunReport) -> &str {
    std::str::from_utf8(&report.output).expect("output is utf-8")
}
