use crate::error::SyntaxError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    Let,
    Fn,
    Class,
    If,
    Else,
    While,
    Break,
    Continue,
    Return,
    Echo,
    Throw,
    Try,
    Catch,
    New,
    This,
    True,
    False,
    Null,
    Eval,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Assign,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier \"{}\"", name),
            Token::Int(i) => format!("integer \"{}\"", i),
            Token::Str(_) => "string literal".to_owned(),
            Token::Eof => "end of file".to_owned(),
            other => format!("token {:?}", other),
        }
    }
}

fn keyword(ident: &str) -> Option<Token> {
    let tok = match ident {
        "let" => Token::Let,
        "fn" => Token::Fn,
        "class" => Token::Class,
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "return" => Token::Return,
        "echo" => Token::Echo,
        "throw" => Token::Throw,
        "try" => Token::Try,
        "catch" => Token::Catch,
        "new" => Token::New,
        "this" => Token::This,
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        "eval" => Token::Eval,
        _ => return None,
    };
    Some(tok)
}

/// A token with the line it started on.
pub type Spanned = (Token, u32);

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        Lexer {
            src,
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_trivia(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'#' => self.skip_line(),
                b'/' if self.peek_at(1) == Some(b'/') => self.skip_line(),
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(b) = self.bump() {
            if b == b'\n' {
                break;
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned, SyntaxError> {
        self.skip_trivia();
        let line = self.line;
        let b = match self.bump() {
            Some(b) => b,
            None => return Ok((Token::Eof, line)),
        };
        let tok = match b {
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b',' => Token::Comma,
            b';' => Token::Semi,
            b'+' => Token::Plus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'-' => self.pick(b'>', Token::Arrow, Token::Minus),
            b'=' => self.pick(b'=', Token::EqEq, Token::Assign),
            b'!' => self.pick(b'=', Token::NotEq, Token::Bang),
            b'<' => self.pick(b'=', Token::Le, Token::Lt),
            b'>' => self.pick(b'=', Token::Ge, Token::Gt),
            b'&' if self.peek() == Some(b'&') => {
                self.bump();
                Token::AndAnd
            }
            b'|' if self.peek() == Some(b'|') => {
                self.bump();
                Token::OrOr
            }
            b'"' => self.string(line)?,
            b'0'..=b'9' => self.number(b, line)?,
            b if b == b'_' || b.is_ascii_alphabetic() => self.ident(),
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character '{}'", std::ascii::escape_default(other)),
                    line,
                ))
            }
        };
        Ok((tok, line))
    }

    fn pick(&mut self, next: u8, two: Token, one: Token) -> Token {
        if self.peek() == Some(next) {
            self.bump();
            two
        } else {
            one
        }
    }

    fn string(&mut self, line: u32) -> Result<Token, SyntaxError> {
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => return Err(SyntaxError::new("unterminated string literal", line)),
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(b'\\') => bytes.push(b'\\'),
                    Some(b'"') => bytes.push(b'"'),
                    Some(other) => {
                        bytes.push(b'\\');
                        bytes.push(other);
                    }
                    None => return Err(SyntaxError::new("unterminated string literal", line)),
                },
                Some(b) => bytes.push(b),
            }
        }
        Ok(Token::Str(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn number(&mut self, first: u8, line: u32) -> Result<Token, SyntaxError> {
        let mut n = (first - b'0') as i64;
        while let Some(b @ b'0'..=b'9') = self.peek() {
            self.bump();
            n = n
                .checked_mul(10)
                .and_then(|n| n.checked_add((b - b'0') as i64))
                .ok_or_else(|| SyntaxError::new("integer literal out of range", line))?;
        }
        Ok(Token::Int(n))
    }

    fn ident(&mut self) -> Token {
        let start = self.pos - 1;
        while let Some(b) = self.peek() {
            if b == b'_' || b.is_ascii_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        // ASCII only, so the lossy conversion never substitutes
        let ident = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        keyword(&ident).unwrap_or(Token::Ident(ident))
    }
}

pub fn tokenize(src: &[u8]) -> Result<Vec<Spanned>, SyntaxError> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.0 == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src.as_bytes())
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn operators_and_keywords() {
        assert_eq!(
            kinds("let x = a->b != 3;"),
            vec![
                Token::Let,
                Token::Ident("x".into()),
                Token::Assign,
                Token::Ident("a".into()),
                Token::Arrow,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Int(3),
                Token::Semi,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_lines() {
        let tokens = tokenize(b"# one\n// two\necho 1;").unwrap();
        assert_eq!(tokens[0], (Token::Echo, 3));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\n\"b""#)[0], Token::Str("a\n\"b".into()));
    }

    #[test]
    fn lexical_errors() {
        assert!(tokenize(b"\"open").is_err());
        assert!(tokenize(b"99999999999999999999").is_err());
        assert_eq!(
            tokenize(b"a & b").unwrap_err().message,
            "unexpected character '&'"
        );
    }
}
