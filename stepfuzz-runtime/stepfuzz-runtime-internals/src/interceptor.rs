//! Wrappers around the interpreter's dispatch, native-call and compile entry points.
//!
//! Each wrapper keeps the implementation it replaced and delegates to it once its own checks
//! pass, so with budgets untouched a request behaves exactly as it would unwrapped.

use crate::context::{Counters, HarnessCtx};
use crate::error::Error;
use crate::termination::GuardSite;
use std::rc::Rc;
use stepfuzz_vm::hooks::{Dispatcher, Hooks, NativeInvoker, SourceCompiler};
use stepfuzz_vm::natives::{self, NativeCall};
use stepfuzz_vm::{Bailout, CompileError, HandlerResult, OpArray, Value, Vm};
use tracing::trace;

/// Charges one step per opcode, then runs it through the original dispatcher.
pub struct GovernedDispatcher {
    ctx: Rc<HarnessCtx>,
    original: Rc<dyn Dispatcher>,
}

impl GovernedDispatcher {
    pub fn new(ctx: Rc<HarnessCtx>, original: Rc<dyn Dispatcher>) -> Self {
        GovernedDispatcher { ctx, original }
    }
}

impl Dispatcher for GovernedDispatcher {
    fn step(&self, vm: &mut Vm) -> Result<HandlerResult, Bailout> {
        self.ctx.governor().consume_step()?;
        Counters::bump(&self.ctx.counters().dispatches);
        self.original.step(vm)
    }

    fn execute(&self, vm: &mut Vm) -> Result<(), Bailout> {
        loop {
            match self.step(vm)? {
                HandlerResult::Continue => {}
                HandlerResult::Switch => {
                    Counters::bump(&self.ctx.counters().frame_switches);
                    if let Some(frame) = vm.current_frame() {
                        trace!(
                            function = %frame.op_array.name,
                            line = frame.line(),
                            depth = vm.depth(),
                            "frame switch"
                        );
                    }
                }
                HandlerResult::Return => return Ok(()),
            }
        }
    }
}

/// Charges one step per native call and bounds its string arguments before the body runs.
pub struct GuardedNativeInvoker {
    ctx: Rc<HarnessCtx>,
    original: Option<Rc<dyn NativeInvoker>>,
}

impl GuardedNativeInvoker {
    pub fn new(ctx: Rc<HarnessCtx>, original: Option<Rc<dyn NativeInvoker>>) -> Self {
        GuardedNativeInvoker { ctx, original }
    }
}

impl NativeInvoker for GuardedNativeInvoker {
    fn invoke(&self, vm: &mut Vm, call: &NativeCall) -> Result<Value, Bailout> {
        self.ctx.governor().consume_step()?;
        Counters::bump(&self.ctx.counters().native_calls);
        for arg in call.string_args() {
            self.ctx
                .ceiling()
                .check_size(GuardSite::NativeArgument, arg.len())?;
        }
        match &self.original {
            Some(original) => original.invoke(vm, call),
            None => natives::execute_internal(vm, call),
        }
    }
}

/// Refuses to compile sources above the size ceiling.
pub struct GuardedCompiler {
    ctx: Rc<HarnessCtx>,
    original: Rc<dyn SourceCompiler>,
}

impl GuardedCompiler {
    pub fn new(ctx: Rc<HarnessCtx>, original: Rc<dyn SourceCompiler>) -> Self {
        GuardedCompiler { ctx, original }
    }
}

impl SourceCompiler for GuardedCompiler {
    fn compile(&self, source: &[u8], filename: &str) -> Result<Rc<OpArray>, CompileError> {
        self.ctx
            .ceiling()
            .check_size(GuardSite::CompiledSource, source.len())?;
        Counters::bump(&self.ctx.counters().compilations);
        self.original.compile(source, filename)
    }
}

/// Swap the three wrappers into `hooks`, keeping the current implementations as their delegates.
///
/// A context can be installed once.
pub fn install(hooks: &mut Hooks, ctx: &Rc<HarnessCtx>) -> Result<(), Error> {
    stepfuzz_ensure!(
        !ctx.is_installed(),
        "harness context is already installed"
    );
    hooks.dispatcher = Rc::new(GovernedDispatcher::new(
        ctx.clone(),
        hooks.dispatcher.clone(),
    ));
    hooks.native_invoker = Some(Rc::new(GuardedNativeInvoker::new(
        ctx.clone(),
        hooks.native_invoker.take(),
    )));
    hooks.compiler = Rc::new(GuardedCompiler::new(ctx.clone(), hooks.compiler.clone()));
    ctx.mark_installed();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;
    use crate::termination::TerminationDetails;
    use stepfuzz_vm::{EnvConfig, Environment};

    fn governed(limits: Limits) -> (Rc<Environment>, Rc<HarnessCtx>) {
        let ctx = Rc::new(HarnessCtx::new(limits));
        let mut env = Environment::startup(EnvConfig::default()).unwrap();
        install(env.hooks_mut(), &ctx).unwrap();
        (Rc::new(env), ctx)
    }

    #[test]
    fn transparent_within_budget() {
        let (env, ctx) = governed(Limits::default());
        let mut vm = Vm::new(env, "/t");
        let completion = vm
            .run_main(b"fn sq(x) { return x * x; } echo sq(strlen(\"abc\"));")
            .unwrap();
        assert!(completion.is_returned());
        assert_eq!(vm.output(), b"9");
        assert_eq!(ctx.counters().dispatches.get(), vm.dispatched());
        assert_eq!(ctx.counters().native_calls.get(), 1);
        assert_eq!(ctx.counters().compilations.get(), 1);
        assert_eq!(
            ctx.governor().consumed(),
            vm.dispatched() + ctx.counters().native_calls.get()
        );
    }

    #[test]
    fn installing_twice_is_an_error() {
        let (_, ctx) = governed(Limits::default());
        let mut hooks = Hooks::default();
        assert!(matches!(
            install(&mut hooks, &ctx),
            Err(Error::InternalError(_))
        ));
    }

    #[test]
    fn oversized_source_is_never_compiled() {
        let (env, ctx) = governed(Limits::default().with_max_size(16));
        let mut vm = Vm::new(env, "/t");
        let bailout = vm
            .run_main(b"echo \"this source is longer than sixteen bytes\";")
            .unwrap_err();
        assert!(matches!(
            TerminationDetails::of(&bailout),
            Some(TerminationDetails::SizeCeilingExceeded {
                site: GuardSite::CompiledSource,
                ..
            })
        ));
        assert_eq!(ctx.counters().compilations.get(), 0);
        assert_eq!(vm.dispatched(), 0);
    }
}
