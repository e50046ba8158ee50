mod state;

pub use state::State;

use crate::context::HarnessCtx;
use crate::error::Error;
use crate::interceptor;
use crate::limits::Limits;
use crate::signals;
use crate::termination::TerminationDetails;
use std::fmt;
use std::rc::Rc;
use stepfuzz_vm::{Bailout, Completion, EnvConfig, Environment, NativeFunction, ShutdownReport, Vm};
use tracing::{debug, info, warn};

/// The nominal path every input is submitted under.
pub const FUZZER_REQUEST_PATH: &str = "/fuzzer.script";

/// Outcome of one input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// The input exceeded the size ceiling and was not executed.
    Skipped,
    /// The request ran to its end, including an in-language fatal error.
    Completed,
    /// The harness aborted the request.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Skipped => write!(f, "skipped"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Everything observed while handling one input.
#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub input_len: usize,
    /// How the main script ended, for completed requests.
    pub completion: Option<Completion>,
    /// Why the request was aborted, for aborted requests.
    pub termination: Option<TerminationDetails>,
    /// Steps charged from the start of the request up to the end of its main script, including
    /// the one that aborted it.
    pub steps_consumed: u64,
    /// Steps charged to destructors during shutdown.
    pub shutdown_steps: u64,
    pub shutdown: Option<ShutdownReport>,
    /// Everything the request wrote, shutdown included.
    pub output: Vec<u8>,
}

impl RunReport {
    fn skipped(input_len: usize) -> Self {
        RunReport {
            status: RunStatus::Skipped,
            input_len,
            completion: None,
            termination: None,
            steps_consumed: 0,
            shutdown_steps: 0,
            shutdown: None,
            output: Vec::new(),
        }
    }

    /// Why shutdown was cut short, if the harness did it.
    pub fn shutdown_termination(&self) -> Option<&TerminationDetails> {
        self.shutdown
            .as_ref()
            .and_then(|s| s.bailout.as_ref())
            .and_then(TerminationDetails::of)
    }
}

/// Configures and builds a [`Harness`](struct.Harness.html).
pub struct HarnessBuilder {
    ctx: Rc<HarnessCtx>,
    env_config: EnvConfig,
    natives: Vec<NativeFunction>,
    ignore_sigpipe: bool,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        HarnessBuilder {
            ctx: Rc::new(HarnessCtx::new(Limits::default())),
            env_config: EnvConfig::default(),
            natives: Vec::new(),
            ignore_sigpipe: true,
        }
    }

    /// Replaces the context, so call this before handing the context to anything.
    pub fn limits(mut self, limits: Limits) -> Self {
        self.ctx = Rc::new(HarnessCtx::new(limits));
        self
    }

    pub fn env_config(mut self, env_config: EnvConfig) -> Self {
        self.env_config = env_config;
        self
    }

    /// Register an extra native function with the interpreter environment.
    pub fn with_native(mut self, f: NativeFunction) -> Self {
        self.natives.push(f);
        self
    }

    /// Leave the process's `SIGPIPE` disposition alone.
    pub fn keep_sigpipe(mut self) -> Self {
        self.ignore_sigpipe = false;
        self
    }

    /// The context the built harness will use.
    pub fn context(&self) -> Rc<HarnessCtx> {
        self.ctx.clone()
    }

    /// One-time setup: force tracked allocation, ignore `SIGPIPE`, bring up the interpreter
    /// environment and install the wrappers around its entry points.
    pub fn build(self) -> Result<Harness, Error> {
        let limits = *self.ctx.limits();
        limits.validate()?;
        let env_config = self.env_config.with_tracked_alloc(true);

        if self.ignore_sigpipe {
            signals::ignore_broken_pipe()?;
        }

        let mut env = Environment::startup(env_config)?;
        for f in self.natives {
            env.register_native(f)?;
        }
        interceptor::install(env.hooks_mut(), &self.ctx)?;

        info!(
            max_steps = limits.max_steps,
            max_size = limits.max_size,
            "fuzzing harness set up"
        );
        Ok(Harness {
            env: Rc::new(env),
            ctx: self.ctx,
            state: State::Init,
            last_run: None,
        })
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The fuzzer driver: runs inputs one at a time against a single, long-lived interpreter
/// environment.
pub struct Harness {
    env: Rc<Environment>,
    ctx: Rc<HarnessCtx>,
    state: State,
    last_run: Option<RunReport>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    /// Set up a harness with default settings.
    pub fn setup() -> Result<Harness, Error> {
        HarnessBuilder::new().build()
    }

    pub fn context(&self) -> &Rc<HarnessCtx> {
        &self.ctx
    }

    pub fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    pub fn limits(&self) -> &Limits {
        self.ctx.limits()
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn last_run(&self) -> Option<&RunReport> {
        self.last_run.as_ref()
    }

    /// Run one input as a request and report how it ended.
    ///
    /// Inputs above the size ceiling are skipped without touching the interpreter. Otherwise the
    /// step budget is reset, the input runs as the main script at
    /// [`FUZZER_REQUEST_PATH`](constant.FUZZER_REQUEST_PATH.html), and the request is shut down
    /// whether or not it was aborted.
    ///
    /// # Panics
    ///
    /// Panics if a bailout the harness did not raise escapes the request. That is a defect in the
    /// harness or in a native function registered with it, not in the input.
    pub fn run_one(&mut self, input: &[u8]) -> RunStatus {
        self.state = State::Init;
        if !self.ctx.ceiling().admits(input.len()) {
            debug!(len = input.len(), "input above size ceiling, skipped");
            self.last_run = Some(RunReport::skipped(input.len()));
            return RunStatus::Skipped;
        }
        let governor = self.ctx.governor();
        governor.reset();

        self.state = State::Running;
        let mut vm = Vm::new(self.env.clone(), FUZZER_REQUEST_PATH);
        let outcome = vm.run_main(input);
        let steps_consumed = governor.consumed();

        let (status, completion, termination) = match outcome {
            Ok(completion) => (RunStatus::Completed, Some(completion), None),
            Err(bailout) => (RunStatus::Aborted, None, Some(recover(bailout))),
        };
        self.state = match status {
            RunStatus::Aborted => State::Aborted,
            _ => State::Completed,
        };

        let mut output = vm.take_output();
        let mut shutdown = vm.shutdown();
        output.append(&mut shutdown.output);
        let shutdown_steps = governor.consumed() - steps_consumed;
        if let Some(bailout) = &shutdown.bailout {
            warn!(%bailout, "shutdown cut short");
        }

        debug!(
            %status,
            steps = steps_consumed,
            shutdown_steps,
            termination = ?termination,
            "input finished"
        );
        self.last_run = Some(RunReport {
            status,
            input_len: input.len(),
            completion,
            termination,
            steps_consumed,
            shutdown_steps,
            shutdown: Some(shutdown),
            output,
        });
        status
    }
}

fn recover(bailout: Bailout) -> TerminationDetails {
    match TerminationDetails::from_bailout(bailout) {
        Ok(details) => details,
        Err(foreign) => panic!(
            "harness defect: bailout not raised by the harness escaped the request: {:?}",
            foreign
        ),
    }
}
