use crate::termination::TerminationDetails;
use std::cell::Cell;
use stepfuzz_vm::Bailout;
use tracing::trace;

/// The per-request step budget.
///
/// The budget is never left at zero: the step that exhausts it restores the full budget before
/// raising the abort, so destructors run while the abort is handled start with a fresh budget.
#[derive(Debug)]
pub struct StepGovernor {
    max_steps: u32,
    steps_left: Cell<u32>,
    consumed: Cell<u64>,
}

impl StepGovernor {
    /// A zero budget is accepted here but rejected by
    /// [`Limits::validate`](../limits/struct.Limits.html#method.validate); it aborts every step.
    pub fn new(max_steps: u32) -> Self {
        StepGovernor {
            max_steps,
            steps_left: Cell::new(max_steps),
            consumed: Cell::new(0),
        }
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Steps left before the next abort. Always greater than zero.
    pub fn remaining(&self) -> u32 {
        self.steps_left.get()
    }

    /// Calls to [`consume_step`](#method.consume_step) since the last reset, including the one
    /// that aborted.
    pub fn consumed(&self) -> u64 {
        self.consumed.get()
    }

    pub fn reset(&self) {
        self.steps_left.set(self.max_steps);
        self.consumed.set(0);
    }

    pub fn consume_step(&self) -> Result<(), Bailout> {
        self.consumed.set(self.consumed.get() + 1);
        let left = self.steps_left.get().saturating_sub(1);
        if left == 0 {
            self.steps_left.set(self.max_steps);
            trace!(max_steps = self.max_steps, "step budget exhausted");
            return Err(TerminationDetails::StepBudgetExhausted {
                max_steps: self.max_steps,
            }
            .into_bailout());
        }
        self.steps_left.set(left);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborts_on_the_last_step_with_budget_restored() {
        let governor = StepGovernor::new(5);
        for _ in 0..4 {
            governor.consume_step().unwrap();
            assert!(governor.remaining() > 0);
        }
        let bailout = governor.consume_step().unwrap_err();
        assert_eq!(
            TerminationDetails::of(&bailout),
            Some(&TerminationDetails::StepBudgetExhausted { max_steps: 5 })
        );
        assert_eq!(governor.remaining(), 5);
        assert_eq!(governor.consumed(), 5);
    }

    #[test]
    fn budget_is_never_observed_at_zero() {
        let governor = StepGovernor::new(3);
        for _ in 0..20 {
            let _ = governor.consume_step();
            assert!(governor.remaining() > 0);
        }
    }

    #[test]
    fn single_step_budget_aborts_immediately() {
        let governor = StepGovernor::new(1);
        assert!(governor.consume_step().is_err());
        assert_eq!(governor.remaining(), 1);
    }

    #[test]
    fn reset_restores_full_budget() {
        let governor = StepGovernor::new(10);
        governor.consume_step().unwrap();
        governor.consume_step().unwrap();
        governor.reset();
        assert_eq!(governor.remaining(), 10);
        assert_eq!(governor.consumed(), 0);
    }
}
