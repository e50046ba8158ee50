//! A small, re-entrant bytecode interpreter.
//!
//! Scripts are compiled to [`OpArray`](opcode/struct.OpArray.html)s and executed one opcode at a
//! time by a [`Dispatcher`](hooks/trait.Dispatcher.html). User calls push frames without
//! recursing on the host stack; `eval`, the `call` native and destructors re-enter the installed
//! dispatcher. Dispatch, native invocation and compilation are all routed through replaceable
//! [`Hooks`](hooks/struct.Hooks.html), which is how an embedder bounds what a request may do.

#![deny(bare_trait_objects)]

pub mod compiler;
pub mod environment;
pub mod error;
pub mod frame;
pub mod hooks;
pub mod natives;
pub mod objects;
pub mod opcode;
pub mod value;
pub mod vm;

pub use crate::environment::{EnvConfig, Environment};
pub use crate::error::{Bailout, CompileError, Error, FatalError, SyntaxError};
pub use crate::hooks::{Dispatcher, Hooks, NativeInvoker, SourceCompiler};
pub use crate::natives::{NativeCall, NativeFunction};
pub use crate::opcode::{HandlerResult, OpArray};
pub use crate::value::Value;
pub use crate::vm::{Completion, ShutdownReport, Vm};
