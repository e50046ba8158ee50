use super::ast::*;
use super::lexer::{tokenize, Spanned, Token};
use crate::error::SyntaxError;

/// Bound on syntactic nesting, which also bounds recursion in codegen and when dropping the tree.
pub const MAX_NESTING: usize = 100;

pub fn parse_program(src: &[u8]) -> Result<Vec<Stmt>, SyntaxError> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
        depth: 0,
    };
    let mut program = Vec::new();
    while parser.peek() != &Token::Eof {
        program.push(parser.statement(true)?);
    }
    Ok(program)
}

const BINARY_LEVELS: usize = 4;

/// Binary operators by precedence level, loosest first.
fn binary_op(level: usize, tok: &Token) -> Option<BinaryOp> {
    let op = match (level, tok) {
        (0, Token::EqEq) => BinaryOp::Eq,
        (0, Token::NotEq) => BinaryOp::Ne,
        (1, Token::Lt) => BinaryOp::Lt,
        (1, Token::Le) => BinaryOp::Le,
        (1, Token::Gt) => BinaryOp::Gt,
        (1, Token::Ge) => BinaryOp::Ge,
        (2, Token::Plus) => BinaryOp::Add,
        (2, Token::Minus) => BinaryOp::Sub,
        (3, Token::Star) => BinaryOp::Mul,
        (3, Token::Slash) => BinaryOp::Div,
        (3, Token::Percent) => BinaryOp::Mod,
        _ => return None,
    };
    Some(op)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // the token list always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected<T>(&self) -> Result<T, SyntaxError> {
        Err(SyntaxError::new(
            format!("unexpected {}", self.peek().describe()),
            self.line(),
        ))
    }

    fn expect(&mut self, tok: &Token) -> Result<(), SyntaxError> {
        if self.eat(tok) {
            Ok(())
        } else {
            self.unexpected()
        }
    }

    fn ident(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            Token::Ident(_) => match self.advance() {
                Token::Ident(name) => Ok(name),
                _ => unreachable!(),
            },
            _ => self.unexpected(),
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(SyntaxError::new("nesting too deep", self.line()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.enter()?;
        self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.peek() == &Token::Eof {
                return self.unexpected();
            }
            stmts.push(self.statement(false)?);
        }
        self.leave();
        Ok(stmts)
    }

    fn statement(&mut self, top_level: bool) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        let kind = match self.peek() {
            Token::Let => {
                self.advance();
                let name = self.ident()?;
                self.expect(&Token::Assign)?;
                let value = self.expr()?;
                self.expect(&Token::Semi)?;
                StmtKind::Let(name, value)
            }
            Token::Echo => {
                self.advance();
                let value = self.expr()?;
                self.expect(&Token::Semi)?;
                StmtKind::Echo(value)
            }
            Token::If => self.if_statement()?,
            Token::While => {
                self.advance();
                let cond = self.paren_expr()?;
                let body = self.block()?;
                StmtKind::While { cond, body }
            }
            Token::Break => {
                self.advance();
                self.expect(&Token::Semi)?;
                StmtKind::Break
            }
            Token::Continue => {
                self.advance();
                self.expect(&Token::Semi)?;
                StmtKind::Continue
            }
            Token::Return => {
                self.advance();
                let value = if self.eat(&Token::Semi) {
                    None
                } else {
                    let value = self.expr()?;
                    self.expect(&Token::Semi)?;
                    Some(value)
                };
                StmtKind::Return(value)
            }
            Token::Throw => {
                self.advance();
                let value = self.expr()?;
                self.expect(&Token::Semi)?;
                StmtKind::Throw(value)
            }
            Token::Try => {
                self.advance();
                let body = self.block()?;
                self.expect(&Token::Catch)?;
                self.expect(&Token::LParen)?;
                let var = self.ident()?;
                self.expect(&Token::RParen)?;
                let handler = self.block()?;
                StmtKind::Try { body, var, handler }
            }
            Token::Fn if top_level => {
                self.advance();
                StmtKind::Function(self.function()?)
            }
            Token::Class if top_level => {
                self.advance();
                StmtKind::Class(self.class()?)
            }
            Token::Fn | Token::Class => {
                return Err(SyntaxError::new(
                    "declarations are only allowed at the top level",
                    line,
                ))
            }
            _ => self.expr_statement()?,
        };
        Ok(Stmt { kind, line })
    }

    fn if_statement(&mut self) -> Result<StmtKind, SyntaxError> {
        self.expect(&Token::If)?;
        let cond = self.paren_expr()?;
        let then_branch = self.block()?;
        let else_branch = if self.eat(&Token::Else) {
            if self.peek() == &Token::If {
                let line = self.line();
                self.enter()?;
                let nested = self.if_statement()?;
                self.leave();
                vec![Stmt { kind: nested, line }]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn expr_statement(&mut self) -> Result<StmtKind, SyntaxError> {
        let target = self.expr()?;
        if !self.eat(&Token::Assign) {
            self.expect(&Token::Semi)?;
            return Ok(StmtKind::Expr(target));
        }
        let line = self.line();
        let value = self.expr()?;
        self.expect(&Token::Semi)?;
        match target {
            Expr::Var(name) => Ok(StmtKind::Assign(name, value)),
            Expr::Prop(object, name) => Ok(StmtKind::SetProp {
                object: *object,
                name,
                value,
            }),
            _ => Err(SyntaxError::new("cannot assign to this expression", line)),
        }
    }

    fn function(&mut self) -> Result<FunctionDef, SyntaxError> {
        let name = self.ident()?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                params.push(self.ident()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }
        let body = self.block()?;
        Ok(FunctionDef { name, params, body })
    }

    fn class(&mut self) -> Result<ClassDef, SyntaxError> {
        let name = self.ident()?;
        self.expect(&Token::LBrace)?;
        let mut methods = Vec::new();
        while !self.eat(&Token::RBrace) {
            self.expect(&Token::Fn)?;
            methods.push(self.function()?);
        }
        Ok(ClassDef { name, methods })
    }

    fn paren_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.expect(&Token::LParen)?;
        let e = self.expr()?;
        self.expect(&Token::RParen)?;
        Ok(e)
    }

    fn args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let e = self.or()?;
        self.leave();
        Ok(e)
    }

    // Each binary operator in a chain counts toward the nesting bound, since the
    // left-leaning tree it builds is as deep as the chain is long.
    fn or(&mut self) -> Result<Expr, SyntaxError> {
        let saved = self.depth;
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            self.enter()?;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = saved;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, SyntaxError> {
        let saved = self.depth;
        let mut lhs = self.binary(0)?;
        while self.eat(&Token::AndAnd) {
            self.enter()?;
            let rhs = self.binary(0)?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = saved;
        Ok(lhs)
    }

    fn binary(&mut self, level: usize) -> Result<Expr, SyntaxError> {
        if level == BINARY_LEVELS {
            return self.unary();
        }
        let saved = self.depth;
        let mut lhs = self.binary(level + 1)?;
        while let Some(op) = binary_op(level, self.peek()) {
            self.advance();
            self.enter()?;
            let rhs = self.binary(level + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = saved;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary()?;
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let saved = self.depth;
        let mut e = self.primary()?;
        while self.eat(&Token::Arrow) {
            self.enter()?;
            let name = self.ident()?;
            e = if self.peek() == &Token::LParen {
                let args = self.args()?;
                Expr::Method(Box::new(e), name, args)
            } else {
                Expr::Prop(Box::new(e), name)
            };
        }
        self.depth = saved;
        Ok(e)
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let e = match self.peek() {
            Token::Int(_) | Token::Str(_) | Token::Ident(_) => match self.advance() {
                Token::Int(i) => Expr::Int(i),
                Token::Str(s) => Expr::Str(s),
                Token::Ident(name) => {
                    if self.peek() == &Token::LParen {
                        Expr::Call(name, self.args()?)
                    } else {
                        Expr::Var(name)
                    }
                }
                _ => unreachable!(),
            },
            Token::True => {
                self.advance();
                Expr::Bool(true)
            }
            Token::False => {
                self.advance();
                Expr::Bool(false)
            }
            Token::Null => {
                self.advance();
                Expr::Null
            }
            Token::This => {
                self.advance();
                Expr::This
            }
            Token::New => {
                self.advance();
                let class = self.ident()?;
                Expr::New(class, self.args()?)
            }
            Token::Eval => {
                self.advance();
                Expr::Eval(Box::new(self.paren_expr()?))
            }
            Token::LParen => self.paren_expr()?,
            _ => return self.unexpected(),
        };
        Ok(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Stmt> {
        parse_program(src.as_bytes()).unwrap()
    }

    #[test]
    fn precedence() {
        let program = parse("echo 1 + 2 * 3 == 7 && !x;");
        let expected = Expr::And(
            Box::new(Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Binary(
                    BinaryOp::Add,
                    Box::new(Expr::Int(1)),
                    Box::new(Expr::Binary(
                        BinaryOp::Mul,
                        Box::new(Expr::Int(2)),
                        Box::new(Expr::Int(3)),
                    )),
                )),
                Box::new(Expr::Int(7)),
            )),
            Box::new(Expr::Unary(UnaryOp::Not, Box::new(Expr::Var("x".into())))),
        );
        assert_eq!(program[0].kind, StmtKind::Echo(expected));
    }

    #[test]
    fn property_assignment_and_method_calls() {
        let program = parse("o->p = o->m(1)->q;");
        match &program[0].kind {
            StmtKind::SetProp { name, value, .. } => {
                assert_eq!(name, "p");
                assert!(matches!(value, Expr::Prop(_, q) if q == "q"));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn else_if_chains() {
        let program = parse("if (a) { } else if (b) { echo 1; } else { echo 2; }");
        match &program[0].kind {
            StmtKind::If { else_branch, .. } => {
                assert!(matches!(else_branch[0].kind, StmtKind::If { .. }))
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn nested_declarations_rejected() {
        let err = parse_program(b"fn f() { fn g() {} }").unwrap_err();
        assert_eq!(err.message, "declarations are only allowed at the top level");
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let deep = format!("echo {}1{};", "(".repeat(5000), ")".repeat(5000));
        assert_eq!(
            parse_program(deep.as_bytes()).unwrap_err().message,
            "nesting too deep"
        );
        let chain = format!("echo 1{};", "+1".repeat(5000));
        assert!(parse_program(chain.as_bytes()).is_err());
        let bangs = format!("echo {}1;", "!".repeat(5000));
        assert!(parse_program(bangs.as_bytes()).is_err());
    }

    #[test]
    fn invalid_assignment_target() {
        assert!(parse_program(b"1 = 2;").is_err());
        assert!(parse_program(b"echo 1").is_err());
    }
}
