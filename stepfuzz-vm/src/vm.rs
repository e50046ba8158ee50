use crate::environment::Environment;
use crate::error::{Bailout, CompileError, FatalError};
use crate::frame::{Frame, FrameKind};
use crate::natives::{self, NativeCall};
use crate::objects::{ObjectRef, ObjectStore, ReleaseReport};
use crate::opcode::{ClassDecl, HandlerResult, Op, OpArray};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace};

/// How the main script of a request ended, when it ended without an embedder bailout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Returned,
    UncaughtException(String),
    FatalError(FatalError),
}

impl Completion {
    pub fn is_returned(&self) -> bool {
        matches!(self, Completion::Returned)
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_returned()
    }
}

/// What happened while tearing a request down.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub destructors_run: usize,
    /// A bailout raised by a destructor. Destructors after it were skipped.
    pub bailout: Option<Bailout>,
    pub release: ReleaseReport,
    /// Output not taken before shutdown, including anything destructors wrote.
    pub output: Vec<u8>,
}

/// One request: its execution context, declarations, objects and output.
pub struct Vm {
    env: Rc<Environment>,
    path: Rc<str>,
    frames: Vec<Frame>,
    functions: HashMap<Rc<str>, Rc<OpArray>>,
    classes: HashMap<Rc<str>, Rc<ClassDecl>>,
    objects: ObjectStore,
    exception: Option<Value>,
    retval: Option<Value>,
    output: Vec<u8>,
    dispatched: u64,
    reentry: usize,
}

impl Vm {
    pub fn new(env: Rc<Environment>, path: &str) -> Vm {
        Vm {
            env,
            path: path.into(),
            frames: Vec::new(),
            functions: HashMap::new(),
            classes: HashMap::new(),
            objects: ObjectStore::new(),
            exception: None,
            retval: None,
            output: Vec::new(),
            dispatched: 0,
            reentry: 0,
        }
    }

    pub fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Opcodes executed so far in this request.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn pending_exception(&self) -> Option<&Value> {
        self.exception.as_ref()
    }

    /// Raise an in-language exception. It unwinds once the current opcode finishes.
    pub fn throw(&mut self, value: Value) {
        if self.exception.is_none() {
            self.exception = Some(value);
        }
    }

    pub fn throw_error<S: Into<String>>(&mut self, message: S) {
        self.throw(Value::string(format!("Error: {}", message.into())));
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Bailout> {
        self.check_alloc(self.output.len().saturating_add(bytes.len()))?;
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    /// Fail with a fatal error if a buffer of `len` bytes would exceed the memory limit.
    pub fn check_alloc(&self, len: usize) -> Result<(), Bailout> {
        let limit = self.env.config().memory_limit;
        if len > limit {
            return Err(Bailout::fatal(FatalError::MemoryLimit {
                limit,
                requested: len,
            }));
        }
        Ok(())
    }

    /// Compile `body` and run it as the request's main script.
    ///
    /// Fatal errors are reported to the output and end the script normally; any other bailout is
    /// returned to the caller with the execution context already unwound.
    pub fn run_main(&mut self, body: &[u8]) -> Result<Completion, Bailout> {
        match self.execute_main(body) {
            Ok(None) => Ok(Completion::Returned),
            Ok(Some(uncaught)) => {
                let message = FatalError::UncaughtException(uncaught.clone()).to_string();
                self.report_fatal(&message);
                Ok(Completion::UncaughtException(uncaught))
            }
            Err(Bailout::Fatal(error)) => {
                self.report_fatal(&error.to_string());
                Ok(Completion::FatalError(error))
            }
            Err(other) => Err(other),
        }
    }

    fn execute_main(&mut self, body: &[u8]) -> Result<Option<String>, Bailout> {
        let compiler = Rc::clone(&self.env.hooks().compiler);
        let path = Rc::clone(&self.path);
        let op_array = match compiler.compile(body, &path) {
            Ok(op_array) => op_array,
            Err(CompileError::Syntax(e)) => return Err(Bailout::fatal(FatalError::Syntax(e))),
            Err(CompileError::Bailout(b)) => return Err(b),
        };
        self.declare(&op_array)?;
        self.call_nested(op_array, None, Vec::new())?;
        Ok(self.exception.take().map(|e| e.to_display_string()))
    }

    fn report_fatal(&mut self, message: &str) {
        debug!(path = %self.path, %message, "request ended with a fatal error");
        self.frames.clear();
        self.exception = None;
        self.output.extend_from_slice(b"\nFatal error: ");
        self.output.extend_from_slice(message.as_bytes());
        self.output.push(b'\n');
    }

    /// Bind the functions and classes a unit declares.
    fn declare(&mut self, op_array: &OpArray) -> Result<(), Bailout> {
        for f in &op_array.functions {
            if self.functions.contains_key(&f.name) || self.env.native(&f.name).is_some() {
                return Err(FatalError::FunctionRedeclared(f.name.to_string()).into());
            }
            self.functions.insert(f.name.clone(), f.clone());
        }
        for c in &op_array.classes {
            if self.classes.contains_key(&c.name) {
                return Err(FatalError::ClassRedeclared(c.name.to_string()).into());
            }
            self.classes.insert(c.name.clone(), c.clone());
        }
        Ok(())
    }

    fn check_depth(&self) -> Result<(), Bailout> {
        let max = self.env.config().max_nesting;
        if self.frames.len() >= max {
            return Err(FatalError::NestingLimit(max).into());
        }
        Ok(())
    }

    /// Run `op_array` to completion in a new dispatch invocation, through the installed
    /// dispatcher.
    ///
    /// If the body raises an exception it does not catch, the exception is left pending and
    /// `Null` is returned. On a bailout every frame this invocation pushed is discarded.
    pub fn call_nested(
        &mut self,
        op_array: Rc<OpArray>,
        this: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> Result<Value, Bailout> {
        self.check_depth()?;
        let max_reentry = self.env.config().max_reentry;
        if self.reentry >= max_reentry {
            return Err(FatalError::ReentryLimit(max_reentry).into());
        }
        let base = self.frames.len();
        self.frames
            .push(Frame::new(op_array, this, args, FrameKind::Function, true));
        let dispatcher = Rc::clone(&self.env.hooks().dispatcher);
        self.reentry += 1;
        let result = dispatcher.execute(self);
        self.reentry -= 1;
        match result {
            Ok(()) => Ok(self.retval.take().unwrap_or(Value::Null)),
            Err(bailout) => {
                self.frames.truncate(base);
                Err(bailout)
            }
        }
    }

    /// Call a user function by name from native code.
    pub fn call_user_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, Bailout> {
        match self.functions.get(name).cloned() {
            Some(f) => self.call_nested(f, None, args),
            None => {
                self.throw_error(format!("Call to undefined function {}()", name));
                Ok(Value::Null)
            }
        }
    }

    /// Invoke a native through the installed invoker, or the built-in path if there is none.
    pub fn invoke_native(&mut self, call: &NativeCall) -> Result<Value, Bailout> {
        match self.env.hooks().native_invoker.clone() {
            Some(invoker) => invoker.invoke(self, call),
            None => natives::execute_internal(self, call),
        }
    }

    /// Compile and run `source` as dynamically evaluated code, in a scope of its own.
    pub fn eval(&mut self, source: &[u8]) -> Result<Value, Bailout> {
        let compiler = Rc::clone(&self.env.hooks().compiler);
        let filename = format!("{} : eval()'d code", self.path);
        let op_array = match compiler.compile(source, &filename) {
            Ok(op_array) => op_array,
            Err(CompileError::Syntax(e)) => {
                self.throw(Value::string(format!("ParseError: {}", e)));
                return Ok(Value::Null);
            }
            Err(CompileError::Bailout(b)) => return Err(b),
        };
        self.declare(&op_array)?;
        self.call_nested(op_array, None, Vec::new())
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    /// Execute exactly one opcode of the current frame.
    pub fn dispatch_one(&mut self) -> Result<HandlerResult, Bailout> {
        let op = match self.frames.last_mut() {
            Some(frame) => {
                let next = frame.op_array.ops.get(frame.ip).cloned();
                frame.ip += 1;
                match next {
                    Some(op) => op,
                    None => {
                        frame.push(Value::Null);
                        Op::Return
                    }
                }
            }
            None => return Ok(HandlerResult::Return),
        };
        self.dispatched += 1;
        let result = self.execute_op(op)?;
        if self.exception.is_some() {
            return Ok(self.unwind_exception());
        }
        Ok(result)
    }

    fn execute_op(&mut self, op: Op) -> Result<HandlerResult, Bailout> {
        match op {
            Op::Const(idx) => {
                let frame = self.frame();
                let value = frame.op_array.constants[idx as usize].clone();
                frame.push(value);
            }
            Op::LoadLocal(slot) => {
                let frame = self.frame();
                let value = frame.locals[slot as usize].clone();
                frame.push(value);
            }
            Op::StoreLocal(slot) => {
                let frame = self.frame();
                let value = frame.pop();
                frame.locals[slot as usize] = value;
            }
            Op::Pop => {
                self.frame().pop();
            }
            Op::Add => {
                let (a, b) = self.frame().pop2();
                let sum = self.add(a, b)?;
                self.frame().push(sum);
            }
            Op::Sub | Op::Mul | Op::Div | Op::Mod => {
                let (a, b) = self.frame().pop2();
                let (a, b) = (a.to_int(), b.to_int());
                let value = match op {
                    Op::Sub => a.wrapping_sub(b),
                    Op::Mul => a.wrapping_mul(b),
                    _ if b == 0 => {
                        self.throw_error("Division by zero");
                        return Ok(HandlerResult::Continue);
                    }
                    Op::Div => a.wrapping_div(b),
                    _ => a.wrapping_rem(b),
                };
                self.frame().push(Value::Int(value));
            }
            Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                let (a, b) = self.frame().pop2();
                let ord = compare(&a, &b);
                let value = match op {
                    Op::Lt => ord == Ordering::Less,
                    Op::Le => ord != Ordering::Greater,
                    Op::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                self.frame().push(Value::Bool(value));
            }
            Op::Eq | Op::Ne => {
                let (a, b) = self.frame().pop2();
                let eq = a.loose_eq(&b);
                self.frame()
                    .push(Value::Bool(if let Op::Eq = op { eq } else { !eq }));
            }
            Op::Not => {
                let frame = self.frame();
                let v = frame.pop();
                frame.push(Value::Bool(!v.is_truthy()));
            }
            Op::Neg => {
                let frame = self.frame();
                let v = frame.pop();
                frame.push(Value::Int(v.to_int().wrapping_neg()));
            }
            Op::Jump(target) => {
                self.frame().ip = target as usize;
            }
            Op::JumpIfFalse(target) => {
                let frame = self.frame();
                if !frame.pop().is_truthy() {
                    frame.ip = target as usize;
                }
            }
            Op::JumpIfFalseOrPop(target) => {
                let frame = self.frame();
                if frame.peek().is_truthy() {
                    frame.pop();
                } else {
                    frame.ip = target as usize;
                }
            }
            Op::JumpIfTrueOrPop(target) => {
                let frame = self.frame();
                if frame.peek().is_truthy() {
                    frame.ip = target as usize;
                } else {
                    frame.pop();
                }
            }
            Op::Call { name, argc } => return self.call_function(&name, argc as usize),
            Op::New { class, argc } => return self.instantiate(&class, argc as usize),
            Op::GetProp(name) => match self.frame().pop() {
                Value::Object(object) => {
                    let value = object.get(&name);
                    self.frame().push(value);
                }
                other => self.throw_error(format!(
                    "Attempt to read property \"{}\" on {}",
                    name,
                    other.type_name()
                )),
            },
            Op::SetProp(name) => match self.frame().pop2() {
                (Value::Object(object), value) => object.set(name, value),
                (other, _) => self.throw_error(format!(
                    "Attempt to assign property \"{}\" on {}",
                    name,
                    other.type_name()
                )),
            },
            Op::CallMethod { name, argc } => return self.call_method(&name, argc as usize),
            Op::This => {
                let frame = self.frame();
                let this = frame.this.clone().map_or(Value::Null, Value::Object);
                frame.push(this);
            }
            Op::Echo => {
                let value = self.frame().pop();
                self.write(value.to_display_string().as_bytes())?;
            }
            Op::Eval => {
                let source = self.frame().pop().to_display_string();
                let value = self.eval(source.as_bytes())?;
                if self.exception.is_none() {
                    self.frame().push(value);
                }
            }
            Op::Throw => {
                let value = self.frame().pop();
                self.throw(value);
            }
            Op::Return => return Ok(self.return_from_frame()),
        }
        Ok(HandlerResult::Continue)
    }

    fn add(&self, a: Value, b: Value) -> Result<Value, Bailout> {
        match (&a, &b) {
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                let mut s = a.to_display_string();
                let tail = b.to_display_string();
                self.check_alloc(s.len().saturating_add(tail.len()))?;
                s.push_str(&tail);
                Ok(Value::string(s))
            }
            _ => Ok(Value::Int(a.to_int().wrapping_add(b.to_int()))),
        }
    }

    fn call_function(&mut self, name: &Rc<str>, argc: usize) -> Result<HandlerResult, Bailout> {
        let args = self.frame().pop_n(argc);
        if let Some(f) = self.functions.get(name).cloned() {
            self.check_depth()?;
            trace!(function = %name, depth = self.frames.len(), "enter");
            self.frames
                .push(Frame::new(f, None, args, FrameKind::Function, false));
            return Ok(HandlerResult::Switch);
        }
        match self.env.native(name).cloned() {
            Some(function) => {
                let call = NativeCall { function, args };
                let value = self.invoke_native(&call)?;
                if self.exception.is_none() {
                    self.frame().push(value);
                }
            }
            None => self.throw_error(format!("Call to undefined function {}()", name)),
        }
        Ok(HandlerResult::Continue)
    }

    fn instantiate(&mut self, class: &Rc<str>, argc: usize) -> Result<HandlerResult, Bailout> {
        let args = self.frame().pop_n(argc);
        let decl = match self.classes.get(class).cloned() {
            Some(decl) => decl,
            None => {
                self.throw_error(format!("Class \"{}\" not found", class));
                return Ok(HandlerResult::Continue);
            }
        };
        let object = self.objects.create(decl.clone());
        match decl.constructor() {
            Some(ctor) => {
                self.check_depth()?;
                self.frames.push(Frame::new(
                    ctor.clone(),
                    Some(object),
                    args,
                    FrameKind::Constructor,
                    false,
                ));
                Ok(HandlerResult::Switch)
            }
            None => {
                self.frame().push(Value::Object(object));
                Ok(HandlerResult::Continue)
            }
        }
    }

    fn call_method(&mut self, name: &str, argc: usize) -> Result<HandlerResult, Bailout> {
        let args = self.frame().pop_n(argc);
        let object = match self.frame().pop() {
            Value::Object(object) => object,
            other => {
                self.throw_error(format!(
                    "Call to a member function {}() on {}",
                    name,
                    other.type_name()
                ));
                return Ok(HandlerResult::Continue);
            }
        };
        let method = match object.class().method(name) {
            Some(method) => method.clone(),
            None => {
                self.throw_error(format!(
                    "Call to undefined method {}::{}()",
                    object.class_name(),
                    name
                ));
                return Ok(HandlerResult::Continue);
            }
        };
        self.check_depth()?;
        self.frames.push(Frame::new(
            method,
            Some(object),
            args,
            FrameKind::Function,
            false,
        ));
        Ok(HandlerResult::Switch)
    }

    fn return_from_frame(&mut self) -> HandlerResult {
        let mut frame = match self.frames.pop() {
            Some(frame) => frame,
            None => return HandlerResult::Return,
        };
        let mut value = frame.pop();
        if frame.kind == FrameKind::Constructor {
            if let Some(this) = frame.this.take() {
                value = Value::Object(this);
            }
        }
        if frame.top {
            self.retval = Some(value);
            HandlerResult::Return
        } else {
            self.frame().push(value);
            HandlerResult::Switch
        }
    }

    /// Transfer control to the innermost handler for the pending exception.
    ///
    /// Frames without a handler are popped. Popping the entry frame of the running dispatch
    /// invocation ends it with the exception still pending, so the caller of that invocation
    /// continues unwinding.
    fn unwind_exception(&mut self) -> HandlerResult {
        let mut switched = false;
        loop {
            let frame = match self.frames.last_mut() {
                Some(frame) => frame,
                None => return HandlerResult::Return,
            };
            let faulting = frame.ip.saturating_sub(1);
            if let Some(region) = frame.op_array.handler_for(faulting).copied() {
                frame.stack.clear();
                frame.locals[region.catch_slot as usize] =
                    self.exception.take().unwrap_or(Value::Null);
                frame.ip = region.handler as usize;
                return if switched {
                    HandlerResult::Switch
                } else {
                    HandlerResult::Continue
                };
            }
            let top = frame.top;
            self.frames.pop();
            if top {
                return HandlerResult::Return;
            }
            switched = true;
        }
    }

    /// Tear the request down: run destructors, then release every object.
    ///
    /// Each destructor runs in its own dispatch invocation. A bailout from one of them is caught
    /// here; the remaining objects are marked destructed and skipped.
    pub fn shutdown(mut self) -> ShutdownReport {
        self.frames.clear();
        self.exception = None;
        self.retval = None;

        let mut report = ShutdownReport::default();
        while let Some((object, destructor)) = self.objects.next_pending_destructor() {
            object.mark_destructed();
            match self.call_nested(destructor, Some(object), Vec::new()) {
                Ok(_) => {
                    report.destructors_run += 1;
                    if let Some(e) = self.exception.take() {
                        trace!(exception = ?e, "exception thrown from destructor ignored");
                    }
                }
                Err(bailout) => {
                    debug!(%bailout, "bailout during shutdown, skipping remaining destructors");
                    self.objects.mark_all_destructed();
                    self.exception = None;
                    report.bailout = Some(bailout);
                    break;
                }
            }
        }

        self.frames.clear();
        self.functions.clear();
        self.classes.clear();
        report.release = self.objects.release(self.env.config().tracked_alloc);
        report.output = self.take_output();
        report
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => a.to_int().cmp(&b.to_int()),
    }
}
