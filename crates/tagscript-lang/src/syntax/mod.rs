//! Source text to CST: rule-driven lexer, recursive-descent parser and the
//! persisted binary form.

pub mod codec;
pub mod cst;
pub mod lexer;
pub mod parser;
pub mod rules;
pub mod token;
