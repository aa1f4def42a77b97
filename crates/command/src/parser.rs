//! Turns a token sequence into a parsed invocation.
//!
//! The first token names the bundle and/or command; the rest are options
//! (`-x`, `--long`, `--long=value`) and typed positional arguments.

use std::collections::BTreeMap;

use gort_domain::{Error, Result};

use crate::infer::{infer, InferOptions, Value};
use crate::tokenizer::tokenize;

/// A fully parsed (but not yet resolved) command invocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedCommand {
    /// Empty when the command was given unqualified (`echo` rather than
    /// `gort:echo`) — the resolver searches enabled bundles in that case.
    pub bundle: String,
    pub command: String,
    pub options: BTreeMap<String, Value>,
    pub parameters: Vec<Value>,
}

impl ParsedCommand {
    /// Parse a raw command line end to end.
    pub fn from_input(input: &str, options: InferOptions) -> Result<Self> {
        let tokens = tokenize(input)?;
        Self::from_tokens(&tokens, options)
    }

    /// Parse an already-tokenized command line.
    pub fn from_tokens(tokens: &[String], infer_options: InferOptions) -> Result<Self> {
        let first = tokens
            .first()
            .ok_or(Error::EmptyValue("command"))?;
        let (bundle, command) = split_command(first);

        let mut parsed = ParsedCommand {
            bundle,
            command,
            ..ParsedCommand::default()
        };

        for token in &tokens[1..] {
            if let Some(long) = token.strip_prefix("--") {
                match long.split_once('=') {
                    Some((name, value)) => {
                        parsed
                            .options
                            .insert(name.to_owned(), infer(value, infer_options)?);
                    }
                    None => {
                        parsed.options.insert(long.to_owned(), Value::Bool(true));
                    }
                }
            } else if let Some(shorts) = token.strip_prefix('-') {
                // Only letters form short flags; "-", "-5" and "-0.5"
                // are positional arguments.
                if !shorts.is_empty() && shorts.chars().all(|c| c.is_ascii_alphabetic()) {
                    for c in shorts.chars() {
                        parsed.options.insert(c.to_string(), Value::Bool(true));
                    }
                } else {
                    parsed.parameters.push(infer(token, infer_options)?);
                }
            } else {
                parsed.parameters.push(infer(token, infer_options)?);
            }
        }

        Ok(parsed)
    }

    /// Rendered argument list in invocation order, as handed to the
    /// workload argv.
    pub fn parameter_strings(&self) -> Vec<String> {
        self.parameters.iter().map(Value::as_text).collect()
    }
}

/// Split the leading token on `:` into `(bundle, command)`. No colon
/// leaves the bundle empty for the resolver to fill in.
pub fn split_command(token: &str) -> (String, String) {
    match token.split_once(':') {
        Some((bundle, command)) => (bundle.to_owned(), command.to_owned()),
        None => (String::new(), token.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_and_bare_commands() {
        let parsed = ParsedCommand::from_input("gort:group create dev", InferOptions::default())
            .unwrap();
        assert_eq!(parsed.bundle, "gort");
        assert_eq!(parsed.command, "group");
        assert_eq!(parsed.parameter_strings(), vec!["create", "dev"]);

        let parsed = ParsedCommand::from_input("echo hi", InferOptions::default()).unwrap();
        assert_eq!(parsed.bundle, "");
        assert_eq!(parsed.command, "echo");
    }

    #[test]
    fn options_are_separated_from_parameters() {
        let parsed =
            ParsedCommand::from_input("echo -n --count=3 hello", InferOptions::default()).unwrap();
        assert_eq!(parsed.options.get("n"), Some(&Value::Bool(true)));
        assert_eq!(parsed.options.get("count"), Some(&Value::Int(3)));
        assert_eq!(parsed.parameter_strings(), vec!["hello"]);
    }

    #[test]
    fn negative_numbers_are_parameters_not_flags() {
        let parsed = ParsedCommand::from_input("calc -5 7", InferOptions::default()).unwrap();
        assert!(parsed.options.is_empty());
        assert_eq!(parsed.parameters, vec![Value::Int(-5), Value::Int(7)]);
    }

    #[test]
    fn empty_token_list_is_an_error() {
        assert!(ParsedCommand::from_input("", InferOptions::default()).is_err());
    }

    #[test]
    fn quoted_parameter_keeps_its_text() {
        let parsed =
            ParsedCommand::from_input("echo \"foo bar\"", InferOptions::default()).unwrap();
        assert_eq!(parsed.parameter_strings(), vec!["foo bar"]);
    }
}
