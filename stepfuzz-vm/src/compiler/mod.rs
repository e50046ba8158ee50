//! Source to bytecode.

mod ast;
mod codegen;
mod lexer;
mod parser;

use crate::error::SyntaxError;
use crate::opcode::OpArray;

pub use parser::MAX_NESTING;

/// Name given to the top-level op array of every compiled unit.
pub const MAIN_NAME: &str = "{main}";

/// Compile `source` into a single top-level unit.
///
/// Functions and classes declared in `source` are compiled into the unit's declaration lists and
/// are bound when the unit starts executing.
pub fn compile(source: &[u8], filename: &str) -> Result<OpArray, SyntaxError> {
    let program = parser::parse_program(source)?;
    let mut unit = codegen::Codegen::new(MAIN_NAME, filename.into(), &[]);
    unit.block(&program)?;
    Ok(unit.finish())
}
