//! The command front-end: tokenizer, typed value inference, command-line
//! parsing and the rule language evaluated by the authorization engine.

pub mod infer;
pub mod parser;
pub mod rules;
pub mod tokenizer;

pub use infer::{InferOptions, Value};
pub use parser::ParsedCommand;
pub use rules::Rule;
pub use tokenizer::tokenize;
