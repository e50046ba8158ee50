//! The three entry points an embedder may replace: opcode dispatch, native invocation and source
//! compilation.
//!
//! The environment holds one implementation of each. An embedder that wants to observe or bound
//! execution swaps in its own implementation during startup, keeping the previous one to delegate
//! to.

use crate::compiler;
use crate::error::{Bailout, CompileError};
use crate::natives::NativeCall;
use crate::opcode::{HandlerResult, OpArray};
use crate::value::Value;
use crate::vm::Vm;
use std::rc::Rc;

pub trait Dispatcher {
    /// Execute exactly one opcode of the current frame.
    fn step(&self, vm: &mut Vm) -> Result<HandlerResult, Bailout> {
        vm.dispatch_one()
    }

    /// Drive the current frame until the entry frame of this invocation returns.
    fn execute(&self, vm: &mut Vm) -> Result<(), Bailout> {
        loop {
            match self.step(vm)? {
                HandlerResult::Continue | HandlerResult::Switch => {}
                HandlerResult::Return => return Ok(()),
            }
        }
    }
}

pub trait NativeInvoker {
    fn invoke(&self, vm: &mut Vm, call: &NativeCall) -> Result<Value, Bailout>;
}

pub trait SourceCompiler {
    fn compile(&self, source: &[u8], filename: &str) -> Result<Rc<OpArray>, CompileError>;
}

/// The interpreter's own dispatch loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDispatcher;

impl Dispatcher for DefaultDispatcher {}

/// The interpreter's own compiler.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCompiler;

impl SourceCompiler for DefaultCompiler {
    fn compile(&self, source: &[u8], filename: &str) -> Result<Rc<OpArray>, CompileError> {
        Ok(Rc::new(compiler::compile(source, filename)?))
    }
}

/// Installed entry points.
///
/// `native_invoker` starts out empty: without an installed invoker, native calls go straight to
/// [`execute_internal`](../natives/fn.execute_internal.html).
#[derive(Clone)]
pub struct Hooks {
    pub dispatcher: Rc<dyn Dispatcher>,
    pub native_invoker: Option<Rc<dyn NativeInvoker>>,
    pub compiler: Rc<dyn SourceCompiler>,
}

impl Default for Hooks {
    fn default() -> Self {
        Hooks {
            dispatcher: Rc::new(DefaultDispatcher),
            native_invoker: None,
            compiler: Rc::new(DefaultCompiler),
        }
    }
}
