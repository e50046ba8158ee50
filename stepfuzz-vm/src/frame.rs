use crate::objects::ObjectRef;
use crate::opcode::OpArray;
use crate::value::Value;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Function,
    /// Returns the constructed object instead of the body's return value.
    Constructor,
}

/// One activation record of the execution context.
#[derive(Debug)]
pub struct Frame {
    pub op_array: Rc<OpArray>,
    pub ip: usize,
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
    pub this: Option<ObjectRef>,
    pub kind: FrameKind,
    /// Set on the entry frame of a dispatch invocation; returning from it ends that invocation.
    pub top: bool,
}

impl Frame {
    pub fn new(
        op_array: Rc<OpArray>,
        this: Option<ObjectRef>,
        mut args: Vec<Value>,
        kind: FrameKind,
        top: bool,
    ) -> Frame {
        args.truncate(op_array.params as usize);
        args.resize(op_array.num_locals as usize, Value::Null);
        Frame {
            op_array,
            ip: 0,
            locals: args,
            stack: Vec::new(),
            this,
            kind,
            top,
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    /// Pops `b` then `a`, returning `(a, b)`.
    pub fn pop2(&mut self) -> (Value, Value) {
        let b = self.pop();
        let a = self.pop();
        (a, b)
    }

    pub fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len().saturating_sub(n);
        self.stack.split_off(at)
    }

    pub fn peek(&self) -> &Value {
        self.stack.last().expect("operand stack underflow")
    }

    pub fn line(&self) -> u32 {
        self.op_array.line_of(self.ip.saturating_sub(1))
    }
}
