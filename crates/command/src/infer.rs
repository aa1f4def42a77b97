//! Deterministic typed-value inference over command tokens.
//!
//! Each non-flag token runs through an ordered matcher pipeline; the
//! first matcher that fires decides the type. Optional matchers are
//! switched by [`InferOptions`].

use std::fmt;
use std::sync::LazyLock;

use gort_domain::{Error, Result};
use regex::Regex;

static BOOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(true|True|TRUE|false|False|FALSE)$").unwrap());
static FLOAT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9]*\.[0-9]+$").unwrap());
static INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9]+$").unwrap());
static REGEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^["']?/.*/["']?$"#).unwrap());
static STRING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[\"'\u{201C}\u{201D}].*[\"'\u{201C}\u{201D}]$").unwrap());
static COLLECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_]+)\[(.*)\]$").unwrap());
static LIST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[.*\]$").unwrap());

/// Switches for the optional matchers.
#[derive(Clone, Copy, Debug, Default)]
pub struct InferOptions {
    /// Enables collection references and (with `literal_lists`) list
    /// literals.
    pub complex_types: bool,
    /// Enables the `/.../` regex matcher.
    pub regular_expressions: bool,
    /// When set, tokens that match nothing become [`Value::Unknown`]
    /// instead of an unquoted string.
    pub strict_strings: bool,
    /// Enables `[a, b, c]` list literals (requires `complex_types`).
    pub literal_lists: bool,
}

impl InferOptions {
    /// Every optional matcher switched on.
    pub fn all() -> Self {
        Self {
            complex_types: true,
            regular_expressions: true,
            strict_strings: false,
            literal_lists: true,
        }
    }
}

/// A typed command argument.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// `quote` is the normalized quote flavor, or `'\u{0}'` for a bare
    /// token accepted in lenient mode.
    String { text: String, quote: char },
    Regex(String),
    List(Vec<Value>),
    ListElement { name: String, index: i64 },
    MapElement { name: String, key: String },
    Unknown(String),
}

impl Value {
    /// The textual payload, quotes stripped — what guard comparisons and
    /// workload argv rendering operate on.
    pub fn as_text(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String { text, .. } => text.clone(),
            Value::Regex(pattern) => pattern.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::as_text)
                .collect::<Vec<_>>()
                .join(","),
            Value::ListElement { name, index } => format!("{name}[{index}]"),
            Value::MapElement { name, key } => format!("{name}[{key}]"),
            Value::Unknown(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Infer a single token to a [`Value`].
pub fn infer(token: &str, options: InferOptions) -> Result<Value> {
    if BOOL_RE.is_match(token) {
        return Ok(Value::Bool(token.eq_ignore_ascii_case("true")));
    }

    if FLOAT_RE.is_match(token) {
        let f: f64 = token
            .parse()
            .map_err(|_| Error::Unmarshal(format!("bad float {token}")))?;
        return Ok(Value::Float(f));
    }

    if INT_RE.is_match(token) {
        let i: i64 = token
            .parse()
            .map_err(|_| Error::Unmarshal(format!("bad integer {token}")))?;
        return Ok(Value::Int(i));
    }

    if options.regular_expressions && REGEX_RE.is_match(token) {
        let inner = token.trim_matches(|c| c == '"' || c == '\'');
        let pattern = &inner[1..inner.len() - 1];
        return Ok(Value::Regex(pattern.to_owned()));
    }

    if STRING_RE.is_match(token) && token.chars().count() >= 2 {
        let chars: Vec<char> = token.chars().collect();
        let quote = normalize_quote(chars[0]);
        let text: String = chars[1..chars.len() - 1].iter().collect();
        return Ok(Value::String { text, quote });
    }

    if options.complex_types {
        if let Some(caps) = COLLECTION_RE.captures(token) {
            return infer_collection(&caps[1], &caps[2], options);
        }
        if options.literal_lists && LIST_RE.is_match(token) {
            return infer_list(&token[1..token.len() - 1], options);
        }
    }

    if options.strict_strings {
        Ok(Value::Unknown(token.to_owned()))
    } else {
        Ok(Value::String {
            text: token.to_owned(),
            quote: '\u{0}',
        })
    }
}

fn normalize_quote(c: char) -> char {
    match c {
        '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
        other => other,
    }
}

/// `name[inner]` — an integer index addresses a list element, a string
/// key addresses a map element.
fn infer_collection(name: &str, inner: &str, options: InferOptions) -> Result<Value> {
    let mut element_options = options;
    element_options.complex_types = false;
    element_options.literal_lists = false;

    match infer(inner, element_options)? {
        Value::Int(index) => Ok(Value::ListElement {
            name: name.to_owned(),
            index,
        }),
        Value::String { text, .. } => Ok(Value::MapElement {
            name: name.to_owned(),
            key: text,
        }),
        other => Err(Error::Unmarshal(format!(
            "collection index must be an integer or string, got {other}"
        ))),
    }
}

/// `[a, b, c]` — elements are inferred with complex types disabled.
fn infer_list(inner: &str, options: InferOptions) -> Result<Value> {
    let mut element_options = options;
    element_options.complex_types = false;
    element_options.literal_lists = false;

    let mut items = Vec::new();
    for raw in split_list_items(inner) {
        items.push(infer(&raw, element_options)?);
    }
    Ok(Value::List(items))
}

/// Split a list body on top-level commas. Commas inside quoted regions
/// or `/.../` regex regions are literal.
fn split_list_items(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_regex = false;

    for c in inner.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if in_regex => {
                current.push(c);
                if c == '/' {
                    in_regex = false;
                }
            }
            None => match c {
                '"' | '\'' => {
                    current.push(c);
                    quote = Some(c);
                }
                '/' => {
                    current.push(c);
                    in_regex = true;
                }
                ',' => items.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        items.push(current);
    }

    items
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_in_all_spellings() {
        for t in ["true", "True", "TRUE"] {
            assert_eq!(infer(t, InferOptions::default()).unwrap(), Value::Bool(true));
        }
        for t in ["false", "False", "FALSE"] {
            assert_eq!(infer(t, InferOptions::default()).unwrap(), Value::Bool(false));
        }
    }

    #[test]
    fn integers_and_floats() {
        assert_eq!(infer("42", InferOptions::default()).unwrap(), Value::Int(42));
        assert_eq!(infer("-7", InferOptions::default()).unwrap(), Value::Int(-7));
        assert_eq!(
            infer("-0.5", InferOptions::default()).unwrap(),
            Value::Float(-0.5)
        );
        assert_eq!(infer(".5", InferOptions::default()).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn integer_inference_is_idempotent() {
        let opts = InferOptions::default();
        let first = infer("1337", opts).unwrap();
        let second = infer("1337", opts).unwrap();
        assert_eq!(first, Value::Int(1337));
        assert_eq!(first, second);
    }

    #[test]
    fn quoted_strings_preserve_flavor() {
        assert_eq!(
            infer("\"hello\"", InferOptions::default()).unwrap(),
            Value::String {
                text: "hello".into(),
                quote: '"'
            }
        );
        assert_eq!(
            infer("'hello'", InferOptions::default()).unwrap(),
            Value::String {
                text: "hello".into(),
                quote: '\''
            }
        );
        assert_eq!(
            infer("\u{201C}hello\u{201D}", InferOptions::default()).unwrap(),
            Value::String {
                text: "hello".into(),
                quote: '"'
            }
        );
    }

    #[test]
    fn bare_token_lenient_vs_strict() {
        assert_eq!(
            infer("staging", InferOptions::default()).unwrap(),
            Value::String {
                text: "staging".into(),
                quote: '\u{0}'
            }
        );
        let strict = InferOptions {
            strict_strings: true,
            ..InferOptions::default()
        };
        assert_eq!(
            infer("staging", strict).unwrap(),
            Value::Unknown("staging".into())
        );
    }

    #[test]
    fn regex_only_when_enabled() {
        let opts = InferOptions {
            regular_expressions: true,
            ..InferOptions::default()
        };
        assert_eq!(
            infer("/ab+c/", opts).unwrap(),
            Value::Regex("ab+c".into())
        );
        // Disabled: falls through to the lenient string fallback.
        assert_eq!(
            infer("/ab+c/", InferOptions::default()).unwrap(),
            Value::String {
                text: "/ab+c/".into(),
                quote: '\u{0}'
            }
        );
    }

    #[test]
    fn collection_references() {
        let opts = InferOptions::all();
        assert_eq!(
            infer("args[0]", opts).unwrap(),
            Value::ListElement {
                name: "args".into(),
                index: 0
            }
        );
        assert_eq!(
            infer("env[\"HOME\"]", opts).unwrap(),
            Value::MapElement {
                name: "env".into(),
                key: "HOME".into()
            }
        );
    }

    #[test]
    fn list_literals_respect_quoting() {
        let opts = InferOptions::all();
        let v = infer("[1,\"a,b\",true]", opts).unwrap();
        assert_eq!(
            v,
            Value::List(vec![
                Value::Int(1),
                Value::String {
                    text: "a,b".into(),
                    quote: '"'
                },
                Value::Bool(true),
            ])
        );
    }

    #[test]
    fn list_splitting_respects_regex_regions() {
        let opts = InferOptions {
            complex_types: true,
            literal_lists: true,
            regular_expressions: true,
            strict_strings: false,
        };
        let v = infer("[/a,b/,2]", opts).unwrap();
        assert_eq!(
            v,
            Value::List(vec![Value::Regex("a,b".into()), Value::Int(2)])
        );
    }
}
