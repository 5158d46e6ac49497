//! The grading script language.
//!
//! Scripts use brace-delimited blocks with Python-flavoured expressions.
//! The only bindings a script sees are `student_answers`, `question_id` and
//! `answer` (read-only) plus `points_awarded` and `feedback`, which it sets.
//!
//! ```text
//! ans = answer.strip().lower()
//! if ans in ["h2o", "water"] {
//!     points_awarded = 2
//!     feedback = "Correct"
//! } else {
//!     feedback = "Expected water"
//! }
//! ```

pub mod ast;
pub mod builtins;
pub mod checker;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

use thiserror::Error;

pub use ast::{Position, Program};
pub use interpreter::{Budget, Inputs, Outputs, execute};
pub use value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LanguageError {
    #[error("syntax error at {position}: {message}")]
    Syntax { message: String, position: Position },

    #[error("not allowed at {position}: {message}")]
    Capability { message: String, position: Position },

    #[error("line {line}: {message}")]
    Runtime { message: String, line: usize },

    #[error("line {line}: memory limit exceeded")]
    MemoryExhausted { line: usize },

    #[error("execution interrupted")]
    Interrupted,
}

/// Parses and capability-checks `source`.
pub fn compile(source: &str) -> Result<Program, LanguageError> {
    let program = parser::parse(source)?;
    checker::check(&program)?;
    Ok(program)
}
