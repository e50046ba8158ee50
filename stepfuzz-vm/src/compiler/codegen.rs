use super::ast::*;
use crate::error::SyntaxError;
use crate::opcode::{ClassDecl, Op, OpArray, TryRegion};
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

struct LoopLabels {
    start: u32,
    breaks: Vec<usize>,
}

pub(super) struct Codegen {
    name: Rc<str>,
    filename: Rc<str>,
    params: u32,
    ops: Vec<Op>,
    lines: Vec<u32>,
    constants: Vec<Value>,
    locals: HashMap<String, u32>,
    local_names: Vec<Rc<str>>,
    try_regions: Vec<TryRegion>,
    loops: Vec<LoopLabels>,
    functions: Vec<Rc<OpArray>>,
    classes: Vec<Rc<ClassDecl>>,
    line: u32,
}

impl Codegen {
    pub(super) fn new(name: &str, filename: Rc<str>, params: &[String]) -> Self {
        let mut cg = Codegen {
            name: name.into(),
            filename,
            params: params.len() as u32,
            ops: Vec::new(),
            lines: Vec::new(),
            constants: Vec::new(),
            locals: HashMap::new(),
            local_names: Vec::new(),
            try_regions: Vec::new(),
            loops: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
            line: 1,
        };
        // parameters take the first slots, in order; a repeated name binds the last one
        for (i, param) in params.iter().enumerate() {
            cg.local_names.push(param.as_str().into());
            cg.locals.insert(param.clone(), i as u32);
        }
        cg
    }

    pub(super) fn finish(mut self) -> OpArray {
        let null = self.constant(Value::Null);
        self.emit(Op::Const(null));
        self.emit(Op::Return);
        OpArray {
            name: self.name,
            filename: self.filename,
            params: self.params,
            num_locals: self.local_names.len() as u32,
            local_names: self.local_names,
            ops: self.ops,
            lines: self.lines,
            constants: self.constants,
            try_regions: self.try_regions,
            functions: self.functions,
            classes: self.classes,
        }
    }

    fn emit(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.lines.push(self.line);
        self.ops.len() - 1
    }

    fn here(&self) -> u32 {
        self.ops.len() as u32
    }

    fn patch(&mut self, at: usize, target: u32) {
        match &mut self.ops[at] {
            Op::Jump(t)
            | Op::JumpIfFalse(t)
            | Op::JumpIfFalseOrPop(t)
            | Op::JumpIfTrueOrPop(t) => *t = target,
            other => unreachable!("patching non-jump {:?}", other),
        }
    }

    fn constant(&mut self, value: Value) -> u32 {
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    fn local(&mut self, name: &str) -> u32 {
        if let Some(slot) = self.locals.get(name) {
            return *slot;
        }
        let slot = self.local_names.len() as u32;
        self.local_names.push(name.into());
        self.locals.insert(name.to_owned(), slot);
        slot
    }

    pub(super) fn block(&mut self, stmts: &[Stmt]) -> Result<(), SyntaxError> {
        for stmt in stmts {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), SyntaxError> {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Let(name, value) | StmtKind::Assign(name, value) => {
                self.expr(value)?;
                let slot = self.local(name);
                self.emit(Op::StoreLocal(slot));
            }
            StmtKind::SetProp {
                object,
                name,
                value,
            } => {
                self.expr(object)?;
                self.expr(value)?;
                self.emit(Op::SetProp(name.as_str().into()));
            }
            StmtKind::Expr(e) => {
                self.expr(e)?;
                self.emit(Op::Pop);
            }
            StmtKind::Echo(e) => {
                self.expr(e)?;
                self.emit(Op::Echo);
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond)?;
                let to_else = self.emit(Op::JumpIfFalse(0));
                self.block(then_branch)?;
                let to_end = self.emit(Op::Jump(0));
                let else_start = self.here();
                self.patch(to_else, else_start);
                self.block(else_branch)?;
                let end = self.here();
                self.patch(to_end, end);
            }
            StmtKind::While { cond, body } => {
                let start = self.here();
                self.expr(cond)?;
                let exit = self.emit(Op::JumpIfFalse(0));
                self.loops.push(LoopLabels {
                    start,
                    breaks: Vec::new(),
                });
                self.block(body)?;
                self.emit(Op::Jump(start));
                let end = self.here();
                self.patch(exit, end);
                if let Some(labels) = self.loops.pop() {
                    for at in labels.breaks {
                        self.patch(at, end);
                    }
                }
            }
            StmtKind::Break => {
                let at = self.emit(Op::Jump(0));
                match self.loops.last_mut() {
                    Some(labels) => labels.breaks.push(at),
                    None => return Err(SyntaxError::new("'break' not in a loop", stmt.line)),
                }
            }
            StmtKind::Continue => {
                let start = match self.loops.last() {
                    Some(labels) => labels.start,
                    None => return Err(SyntaxError::new("'continue' not in a loop", stmt.line)),
                };
                self.emit(Op::Jump(start));
            }
            StmtKind::Return(value) => {
                match value {
                    Some(e) => self.expr(e)?,
                    None => {
                        let null = self.constant(Value::Null);
                        self.emit(Op::Const(null));
                    }
                }
                self.emit(Op::Return);
            }
            StmtKind::Throw(e) => {
                self.expr(e)?;
                self.emit(Op::Throw);
            }
            StmtKind::Try { body, var, handler } => {
                let start = self.here();
                self.block(body)?;
                let skip = self.emit(Op::Jump(0));
                let catch_slot = self.local(var);
                self.try_regions.push(TryRegion {
                    start,
                    end: skip as u32,
                    handler: skip as u32 + 1,
                    catch_slot,
                });
                self.block(handler)?;
                let end = self.here();
                self.patch(skip, end);
            }
            StmtKind::Function(def) => {
                if self.functions.iter().any(|f| &*f.name == def.name.as_str()) {
                    return Err(SyntaxError::new(
                        format!("cannot redeclare {}()", def.name),
                        stmt.line,
                    ));
                }
                let f = function(def, &def.name, self.filename.clone())?;
                self.functions.push(Rc::new(f));
            }
            StmtKind::Class(def) => {
                if self.classes.iter().any(|c| &*c.name == def.name.as_str()) {
                    return Err(SyntaxError::new(
                        format!("cannot redeclare class {}", def.name),
                        stmt.line,
                    ));
                }
                let mut methods: Vec<(Rc<str>, Rc<OpArray>)> = Vec::new();
                for m in &def.methods {
                    if methods.iter().any(|(n, _)| &**n == m.name.as_str()) {
                        return Err(SyntaxError::new(
                            format!("cannot redeclare {}::{}()", def.name, m.name),
                            stmt.line,
                        ));
                    }
                    let qualified = format!("{}::{}", def.name, m.name);
                    let body = function(m, &qualified, self.filename.clone())?;
                    methods.push((m.name.as_str().into(), Rc::new(body)));
                }
                self.classes.push(Rc::new(ClassDecl {
                    name: def.name.as_str().into(),
                    methods,
                }));
            }
        }
        Ok(())
    }

    fn expr(&mut self, e: &Expr) -> Result<(), SyntaxError> {
        match e {
            Expr::Int(i) => self.push_constant(Value::Int(*i)),
            Expr::Str(s) => self.push_constant(Value::string(s.as_str())),
            Expr::Bool(b) => self.push_constant(Value::Bool(*b)),
            Expr::Null => self.push_constant(Value::Null),
            Expr::Var(name) => {
                let slot = self.local(name);
                self.emit(Op::LoadLocal(slot));
            }
            Expr::This => {
                self.emit(Op::This);
            }
            Expr::Unary(op, operand) => {
                self.expr(operand)?;
                self.emit(match op {
                    UnaryOp::Not => Op::Not,
                    UnaryOp::Neg => Op::Neg,
                });
            }
            Expr::Binary(op, lhs, rhs) => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.emit(match op {
                    BinaryOp::Add => Op::Add,
                    BinaryOp::Sub => Op::Sub,
                    BinaryOp::Mul => Op::Mul,
                    BinaryOp::Div => Op::Div,
                    BinaryOp::Mod => Op::Mod,
                    BinaryOp::Lt => Op::Lt,
                    BinaryOp::Le => Op::Le,
                    BinaryOp::Gt => Op::Gt,
                    BinaryOp::Ge => Op::Ge,
                    BinaryOp::Eq => Op::Eq,
                    BinaryOp::Ne => Op::Ne,
                });
            }
            Expr::And(lhs, rhs) => {
                self.expr(lhs)?;
                let short = self.emit(Op::JumpIfFalseOrPop(0));
                self.expr(rhs)?;
                let end = self.here();
                self.patch(short, end);
            }
            Expr::Or(lhs, rhs) => {
                self.expr(lhs)?;
                let short = self.emit(Op::JumpIfTrueOrPop(0));
                self.expr(rhs)?;
                let end = self.here();
                self.patch(short, end);
            }
            Expr::Call(name, args) => {
                self.exprs(args)?;
                self.emit(Op::Call {
                    name: name.as_str().into(),
                    argc: args.len() as u32,
                });
            }
            Expr::New(class, args) => {
                self.exprs(args)?;
                self.emit(Op::New {
                    class: class.as_str().into(),
                    argc: args.len() as u32,
                });
            }
            Expr::Prop(object, name) => {
                self.expr(object)?;
                self.emit(Op::GetProp(name.as_str().into()));
            }
            Expr::Method(object, name, args) => {
                self.expr(object)?;
                self.exprs(args)?;
                self.emit(Op::CallMethod {
                    name: name.as_str().into(),
                    argc: args.len() as u32,
                });
            }
            Expr::Eval(source) => {
                self.expr(source)?;
                self.emit(Op::Eval);
            }
        }
        Ok(())
    }

    fn exprs(&mut self, es: &[Expr]) -> Result<(), SyntaxError> {
        for e in es {
            self.expr(e)?;
        }
        Ok(())
    }

    fn push_constant(&mut self, value: Value) {
        let idx = self.constant(value);
        self.emit(Op::Const(idx));
    }
}

fn function(def: &FunctionDef, name: &str, filename: Rc<str>) -> Result<OpArray, SyntaxError> {
    let mut cg = Codegen::new(name, filename, &def.params);
    cg.block(&def.body)?;
    Ok(cg.finish())
}
