mod test_helpers;

use crate::test_helpers::{output, probed_harness, probed_harness_from, run};
use stepfuzz_runtime::{GuardSite, Harness, Limits, RunStatus, TerminationDetails};

fn exceeded(site: GuardSite, len: usize) -> Option<TerminationDetails> {
    Some(TerminationDetails::SizeCeilingExceeded {
        site,
        len,
        max_size: 8192,
    })
}

/// `src` padded with trailing spaces to exactly `len` bytes.
fn padded(src: &str, len: usize) -> Vec<u8> {
    let mut input = src.as_bytes().to_vec();
    input.resize(len, b' ');
    input
}

#[test]
fn oversized_input_is_skipped_untouched() {
    let (mut h, _) = probed_harness();
    let counters = h.context().counters();
    let before = (
        counters.dispatches.get(),
        counters.native_calls.get(),
        counters.compilations.get(),
    );

    assert_eq!(h.run_one(&padded("echo 1;", 8193)), RunStatus::Skipped);

    let counters = h.context().counters();
    let after = (
        counters.dispatches.get(),
        counters.native_calls.get(),
        counters.compilations.get(),
    );
    assert_eq!(before, after);
    let report = h.last_run().unwrap();
    assert_eq!(report.input_len, 8193);
    assert_eq!(report.steps_consumed, 0);
    assert!(report.shutdown.is_none());
    assert!(report.output.is_empty());
}

#[test]
fn input_at_the_ceiling_runs() {
    let (mut h, _) = probed_harness();
    assert_eq!(h.run_one(&padded("echo 1;", 8192)), RunStatus::Completed);
    assert_eq!(output(h.last_run().unwrap()), "1");
}

#[test]
fn native_argument_at_the_ceiling_is_admitted() {
    let (mut h, probes) = probed_harness();
    let report = run(&mut h, "echo sink(str_repeat(\"a\", 8192));");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(output(report), "8192");
    assert_eq!(probes.sink_calls.get(), 1);
}

#[test]
fn oversized_native_argument_aborts_before_the_body() {
    let (mut h, probes) = probed_harness();
    let report = run(&mut h, "echo \"before\"; sink(str_repeat(\"a\", 8193)); echo \"after\";");
    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.termination, exceeded(GuardSite::NativeArgument, 8193));
    assert_eq!(output(report), "before");
    assert_eq!(probes.sink_calls.get(), 0);
}

#[test]
fn every_string_argument_is_checked() {
    let (mut h, _) = probed_harness();
    let report = run(&mut h, "str_replace(\"a\", \"b\", str_repeat(\"c\", 9000));");
    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.termination, exceeded(GuardSite::NativeArgument, 9000));
}

#[test]
fn non_string_arguments_are_not_size_checked() {
    let (mut h, probes) = probed_harness();
    let report = run(&mut h, "echo sink(1000000);");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(output(report), "7");
    assert_eq!(probes.sink_calls.get(), 1);
}

#[test]
fn large_strings_that_stay_in_script_are_fine() {
    let (mut h, _) = probed_harness();
    let report = run(&mut h, "let s = str_repeat(\"a\", 20000); s = s + s; echo \"ok\";");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(output(report), "ok");
}

#[test]
fn oversized_eval_aborts_before_compiling() {
    let (mut h, _) = probed_harness();
    let compilations = h.context().counters().compilations.get();
    // "echo 1;" is 7 bytes, so this source is 8197 bytes long
    let report = run(&mut h, "eval(str_repeat(\"echo 1;\", 1171));");
    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.termination, exceeded(GuardSite::CompiledSource, 8197));
    assert_eq!(output(report), "");
    // only the main script was compiled
    assert_eq!(h.context().counters().compilations.get() - compilations, 1);
}

#[test]
fn eval_at_the_ceiling_runs() {
    let (mut h, _) = probed_harness();
    let report = run(&mut h, "eval(str_repeat(\" \", 8185) + \"echo 1;\");");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(output(report), "1");
}

#[test]
fn oversized_eval_cannot_be_caught() {
    let (mut h, _) = probed_harness();
    let report = run(
        &mut h,
        "try { eval(str_repeat(\"#\", 10000)); } catch (e) { echo \"caught\"; }",
    );
    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.termination, exceeded(GuardSite::CompiledSource, 10000));
    assert_eq!(output(report), "");
}

#[test]
fn custom_size_ceiling() {
    let (mut h, probes) =
        probed_harness_from(Harness::builder().limits(Limits::default().with_max_size(16)));
    assert_eq!(h.run_one(&padded("sink(\"aaaa\");", 17)), RunStatus::Skipped);
    assert_eq!(h.run_one(&padded("sink(\"aaaa\");", 16)), RunStatus::Completed);
    assert_eq!(probes.sink_calls.get(), 1);

    let report = run(&mut h, "sink(\"abcdefghijklmnopq\");");
    assert_eq!(report.status, RunStatus::Skipped);
    let report = run(&mut h, "sink(\"x\" + \"y\");");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(probes.sink_calls.get(), 2);
}
