//! The embedded expression language: tokenizer, parser and evaluator.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, ParamDecl, Stmt};
pub use eval::{evaluate, execute};
pub use parser::{parse_expression, parse_statements};
