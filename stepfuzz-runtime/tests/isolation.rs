mod test_helpers;

use crate::test_helpers::{output, probed_harness, run};
use stepfuzz_runtime::vm::{Completion, FatalError};
use stepfuzz_runtime::{RunStatus, TerminationDetails};

#[test]
fn aborted_request_leaves_nothing_behind() {
    let (mut h, _) = probed_harness();
    let report = run(
        &mut h,
        "class N { fn init() { this->me = this; } }
         fn leftover() { return 1; }
         let a = new N(); let b = new N(); a->other = b; b->other = a;
         while (true) {}",
    );
    assert_eq!(report.status, RunStatus::Aborted);
    let release = report.shutdown.as_ref().unwrap().release;
    assert_eq!(release.released, 2);
    assert_eq!(release.leaked, 0);

    let report = run(&mut h, "try { leftover(); } catch (e) { echo e; }");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(output(report), "Error: Call to undefined function leftover()");

    let report = run(&mut h, "");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.completion, Some(Completion::Returned));
    assert!(report.output.is_empty());
}

#[test]
fn abort_mid_constructor_is_cleaned_up() {
    let (mut h, _) = probed_harness();
    let report = run(
        &mut h,
        "class Half { fn init() { this->a = 1; while (true) {} } fn drop() { echo \"dropped\"; } }
         new Half();",
    );
    assert_eq!(report.status, RunStatus::Aborted);
    let shutdown = report.shutdown.as_ref().unwrap();
    assert_eq!(shutdown.release.leaked, 0);
    // destructors still run for whatever the request managed to create
    assert_eq!(output(report), "dropped");

    assert_eq!(run(&mut h, "echo 1;").status, RunStatus::Completed);
}

#[test]
fn classes_can_be_redeclared_by_later_requests() {
    let (mut h, _) = probed_harness();
    let src = "class C { fn init() { echo \"c\"; } } new C(); while (true) {}";
    assert_eq!(run(&mut h, src).status, RunStatus::Aborted);
    let report = run(&mut h, "class C { fn init() { echo \"fresh\"; } } new C();");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(output(report), "fresh");
}

#[test]
fn fatal_errors_complete() {
    let (mut h, _) = probed_harness();

    let report = run(&mut h, "fn r() { return r(); } r();");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        report.completion,
        Some(Completion::FatalError(FatalError::NestingLimit(256)))
    );

    let report = run(&mut h, "echo (;");
    assert_eq!(report.status, RunStatus::Completed);
    assert!(matches!(
        report.completion,
        Some(Completion::FatalError(FatalError::Syntax(_)))
    ));

    let report = run(&mut h, "str_repeat(\"a\", 3000000);");
    assert_eq!(report.status, RunStatus::Completed);
    assert!(matches!(
        report.completion,
        Some(Completion::FatalError(FatalError::MemoryLimit { .. }))
    ));
}

#[test]
fn uncaught_exceptions_complete() {
    let (mut h, _) = probed_harness();
    let report = run(&mut h, "echo \"a\"; throw \"boom\"; echo \"b\";");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        report.completion,
        Some(Completion::UncaughtException("boom".to_string()))
    );
    assert!(output(report).starts_with('a'));
    assert!(report.termination.is_none());
}

#[test]
fn status_sequence_is_independent_of_history() {
    let (mut h, _) = probed_harness();
    let inputs: &[(&str, RunStatus)] = &[
        ("echo 1;", RunStatus::Completed),
        ("while (true) {}", RunStatus::Aborted),
        ("echo 1;", RunStatus::Completed),
        ("strlen(str_repeat(\"a\", 9000));", RunStatus::Aborted),
        ("throw 1;", RunStatus::Completed),
        ("echo 1;", RunStatus::Completed),
    ];
    for (src, expected) in inputs {
        assert_eq!(h.run_one(src.as_bytes()), *expected, "input: {}", src);
    }
    let report = h.last_run().unwrap();
    assert_eq!(output(report), "1");
    assert!(report.steps_consumed < 10);
}

#[test]
fn termination_details_are_reported_per_run() {
    let (mut h, _) = probed_harness();
    assert!(run(&mut h, "while (true) {}").termination.is_some());
    let report = run(&mut h, "echo 1;");
    assert_eq!(report.termination, None);
    assert_eq!(report.shutdown_termination(), None::<&TerminationDetails>);
}
