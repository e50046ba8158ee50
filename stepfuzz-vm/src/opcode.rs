use crate::value::Value;
use std::cmp::Reverse;
use std::rc::Rc;

/// Name of the method run by `new`.
pub const CONSTRUCTOR: &str = "init";
/// Name of the method run for each object at request shutdown.
pub const DESTRUCTOR: &str = "drop";

#[derive(Clone, Debug)]
pub enum Op {
    /// Push `constants[n]`.
    Const(u32),
    LoadLocal(u32),
    /// Pop into a local slot.
    StoreLocal(u32),
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Not,
    Neg,
    Jump(u32),
    /// Pop, jump when falsy.
    JumpIfFalse(u32),
    /// Jump keeping the operand when falsy, otherwise pop it. Used by `&&`.
    JumpIfFalseOrPop(u32),
    /// Jump keeping the operand when truthy, otherwise pop it. Used by `||`.
    JumpIfTrueOrPop(u32),
    Call { name: Rc<str>, argc: u32 },
    New { class: Rc<str>, argc: u32 },
    GetProp(Rc<str>),
    SetProp(Rc<str>),
    CallMethod { name: Rc<str>, argc: u32 },
    This,
    Echo,
    Eval,
    Throw,
    Return,
}

/// What an opcode handler asks the dispatch loop to do next.
///
/// This is the whole contract between a handler and whatever drives it; there are no other
/// outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// Keep executing the current frame.
    Continue,
    /// The current frame changed: a call was entered, a callee returned, or an exception unwound
    /// into a caller. The driver must re-read the current frame.
    Switch,
    /// The entry frame of this dispatch invocation finished.
    Return,
}

/// A protected range `[start, end)` and where control goes when an exception is raised in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TryRegion {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    pub catch_slot: u32,
}

/// A compiled unit: a script, an `eval`'d string, a function or a method body.
#[derive(Debug)]
pub struct OpArray {
    pub name: Rc<str>,
    pub filename: Rc<str>,
    /// The first `params` locals are bound from call arguments.
    pub params: u32,
    pub num_locals: u32,
    pub local_names: Vec<Rc<str>>,
    pub ops: Vec<Op>,
    pub lines: Vec<u32>,
    pub constants: Vec<Value>,
    pub try_regions: Vec<TryRegion>,
    /// Declarations bound when this unit starts executing.
    pub functions: Vec<Rc<OpArray>>,
    pub classes: Vec<Rc<ClassDecl>>,
}

impl OpArray {
    pub fn line_of(&self, ip: usize) -> u32 {
        self.lines.get(ip).copied().unwrap_or(0)
    }

    /// The innermost try region covering `ip`.
    ///
    /// Nested regions may share a start, so ties go to the one that ends first.
    pub fn handler_for(&self, ip: usize) -> Option<&TryRegion> {
        self.try_regions
            .iter()
            .filter(|r| r.start as usize <= ip && ip < r.end as usize)
            .max_by_key(|r| (r.start, Reverse(r.end)))
    }
}

#[derive(Debug)]
pub struct ClassDecl {
    pub name: Rc<str>,
    pub methods: Vec<(Rc<str>, Rc<OpArray>)>,
}

impl ClassDecl {
    pub fn method(&self, name: &str) -> Option<&Rc<OpArray>> {
        self.methods
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, m)| m)
    }

    pub fn constructor(&self) -> Option<&Rc<OpArray>> {
        self.method(CONSTRUCTOR)
    }

    pub fn destructor(&self) -> Option<&Rc<OpArray>> {
        self.method(DESTRUCTOR)
    }
}
