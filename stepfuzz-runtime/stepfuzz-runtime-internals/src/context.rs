use crate::governor::StepGovernor;
use crate::guard::SizeCeiling;
use crate::limits::Limits;
use std::cell::Cell;

/// Running totals kept across every input, for reporting and tests.
#[derive(Debug, Default)]
pub struct Counters {
    pub dispatches: Cell<u64>,
    pub frame_switches: Cell<u64>,
    pub native_calls: Cell<u64>,
    pub compilations: Cell<u64>,
}

impl Counters {
    pub(crate) fn bump(counter: &Cell<u64>) {
        counter.set(counter.get() + 1);
    }
}

/// The state the installed wrappers share.
///
/// One context is created per harness and handed to each wrapper by reference count, so the step
/// budget stays owned by the harness while the interpreter's entry points need no extra
/// parameters.
#[derive(Debug)]
pub struct HarnessCtx {
    limits: Limits,
    governor: StepGovernor,
    ceiling: SizeCeiling,
    counters: Counters,
    installed: Cell<bool>,
}

impl HarnessCtx {
    pub fn new(limits: Limits) -> Self {
        HarnessCtx {
            limits,
            governor: StepGovernor::new(limits.max_steps),
            ceiling: SizeCeiling::new(limits.max_size),
            counters: Counters::default(),
            installed: Cell::new(false),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn governor(&self) -> &StepGovernor {
        &self.governor
    }

    pub fn ceiling(&self) -> &SizeCeiling {
        &self.ceiling
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn is_installed(&self) -> bool {
        self.installed.get()
    }

    pub(crate) fn mark_installed(&self) {
        self.installed.set(true);
    }
}
