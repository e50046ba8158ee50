//! Every admitted input ends, and no input changes how the next one is handled.

mod test_helpers;

use crate::test_helpers::{probed_harness, run};
use stepfuzz_runtime::{Harness, RunStatus};

/// Script fragments that are individually harmless or hostile, glued together at random.
const FRAGMENTS: &[&str] = &[
    "while (true) {",
    "while (1) { probe(); ",
    "}",
    "echo 1;",
    "fn f(a) {",
    "return f(a);",
    "return a + a;",
    "f(1);",
    "f(\"x\");",
    "eval(\"",
    "\");",
    "\\\"",
    "try {",
    "} catch (e) {",
    "throw e;",
    "let x = ",
    "str_repeat(\"ab\", 4000)",
    "str_repeat(x, 3)",
    ";",
    "x = x + x;",
    "class C { fn init() { this->c = this; } fn drop() { new C(); } }",
    "new C();",
    "call(\"f\", 2);",
    "sink(x);",
    "(",
    ")",
    "break;",
    "if (x) {",
    "} else {",
    "{",
    "#",
    "\n",
];

/// A small xorshift generator, so failures reproduce exactly.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

fn fragment_input(rng: &mut Rng) -> Vec<u8> {
    let count = 1 + rng.below(24);
    let mut input = String::new();
    for _ in 0..count {
        input.push_str(FRAGMENTS[rng.below(FRAGMENTS.len())]);
        input.push(' ');
    }
    input.into_bytes()
}

fn byte_input(rng: &mut Rng) -> Vec<u8> {
    let len = rng.below(256);
    (0..len).map(|_| rng.next() as u8).collect()
}

fn assert_sane(h: &Harness, input: &[u8]) {
    let report = h.last_run().unwrap();
    assert_eq!(report.input_len, input.len());
    match report.status {
        RunStatus::Skipped => assert!(input.len() > 8192),
        RunStatus::Completed => {
            assert!(report.completion.is_some());
            assert!(report.termination.is_none());
            assert!(report.steps_consumed < 1000);
        }
        RunStatus::Aborted => {
            assert!(report.termination.is_some());
            assert!(report.steps_consumed <= 1000);
        }
    }
    if let Some(shutdown) = &report.shutdown {
        assert_eq!(shutdown.release.leaked, 0, "input: {:?}", input);
    }
    assert!(report.shutdown_steps <= 1000);
    assert!(h.context().governor().remaining() > 0);
}

#[test]
fn generated_scripts_terminate() {
    let (mut h, _) = probed_harness();
    let mut rng = Rng(0x5eed_1234_abcd_0001);
    for _ in 0..500 {
        let input = fragment_input(&mut rng);
        h.run_one(&input);
        assert_sane(&h, &input);
    }
    // the harness is still in working order afterwards
    assert_eq!(h.run_one(b"echo 1;"), RunStatus::Completed);
}

#[test]
fn random_bytes_terminate() {
    let (mut h, _) = probed_harness();
    let mut rng = Rng(0x0bad_cafe_f00d_0042);
    for _ in 0..500 {
        let input = byte_input(&mut rng);
        h.run_one(&input);
        assert_sane(&h, &input);
    }
    assert_eq!(h.run_one(b"echo 1;"), RunStatus::Completed);
}

#[test]
fn hostile_scripts_terminate() {
    let deep_parens = format!("echo {}1{};", "(".repeat(3000), ")".repeat(3000));
    let hostile: Vec<(&str, RunStatus)> = vec![
        ("let s = \"a\"; while (true) { s = s + s; }", RunStatus::Completed),
        ("fn f() { f(); f(); } f();", RunStatus::Completed),
        ("fn h(n) { if (n < 20) { h(n + 1); h(n + 1); } } h(0);", RunStatus::Aborted),
        (
            "eval(\"eval(\\\"eval(\\\\\\\"while (true) {}\\\\\\\");\\\");\");",
            RunStatus::Aborted,
        ),
        ("while (true) { try { throw 1; } catch (e) {} }", RunStatus::Aborted),
        ("fn g() { return call(\"g\"); } g();", RunStatus::Completed),
        (&deep_parens, RunStatus::Completed),
        ("class A { fn drop() { new A(); } } new A();", RunStatus::Completed),
    ];
    let (mut h, _) = probed_harness();
    for (src, expected) in hostile {
        let report = run(&mut h, src);
        assert_eq!(report.status, expected, "input: {}", src);
        assert_sane(&h, src.as_bytes());
    }
}
