//! Splits a raw command line into tokens, preserving quotes.
//!
//! Quoted tokens keep their (normalized) quote characters so downstream
//! inference can tell a quoted string from a bare word. Positions in
//! error messages are 1-based character offsets.

use gort_domain::{Error, Result};

/// Any of these opens (and closes) a double-quoted region. Smart quotes
/// are normalized to the straight double quote in the emitted token.
fn is_double_quote(c: char) -> bool {
    matches!(c, '"' | '\u{201C}' | '\u{201D}' | '\u{201E}')
}

/// Tokenize a raw UTF-8 command line.
///
/// - Whitespace separates tokens unless inside a quoted region.
/// - `"`, `'` and the smart double quotes delimit quoted regions; a
///   quoted token is emitted with straight quotes retained.
/// - Backslash is a control character: `\n` and `\t` substitute a literal
///   newline/tab; any other escaped character is taken verbatim.
/// - Empty input yields an empty sequence.
pub fn tokenize(input: &str) -> Result<Vec<String>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            i += 1;
            continue;
        }

        if c == '\\' {
            let (substituted, next) = escape(&chars, i)?;
            current.push(substituted);
            i = next;
            continue;
        }

        if is_double_quote(c) || c == '\'' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            let (token, next) = quoted_region(&chars, i)?;
            tokens.push(token);
            i = next;
            continue;
        }

        current.push(c);
        i += 1;
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Consume a quoted region starting at `open` (index of the opening
/// quote). Returns the emitted token, quotes included, and the index
/// just past the closing quote.
fn quoted_region(chars: &[char], open: usize) -> Result<(String, usize)> {
    let double = is_double_quote(chars[open]);
    let norm = if double { '"' } else { '\'' };
    let mut token = String::new();
    token.push(norm);

    let mut i = open + 1;
    loop {
        if i >= chars.len() {
            return Err(Error::Tokenize(format!("unterminated quote at {}", open + 1)));
        }
        let c = chars[i];
        let closes = if double { is_double_quote(c) } else { c == '\'' };
        if closes {
            token.push(norm);
            return Ok((token, i + 1));
        }
        if c == '\\' {
            let (substituted, next) = escape(chars, i)?;
            token.push(substituted);
            i = next;
            continue;
        }
        token.push(c);
        i += 1;
    }
}

/// Resolve a backslash control character at index `bs`. Returns the
/// substituted character and the index just past the escape.
fn escape(chars: &[char], bs: usize) -> Result<(char, usize)> {
    match chars.get(bs + 1) {
        None => Err(Error::Tokenize(format!(
            "unterminated control character at {}",
            bs + 1
        ))),
        Some('n') => Ok(('\n', bs + 2)),
        Some('t') => Ok(('\t', bs + 2)),
        Some(&other) => Ok((other, bs + 2)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words() {
        assert_eq!(
            tokenize("echo foo bar").unwrap(),
            vec!["echo", "foo", "bar"]
        );
    }

    #[test]
    fn double_quoted_token_retains_quotes() {
        assert_eq!(
            tokenize(r#"echo -n "foo bar""#).unwrap(),
            vec!["echo", "-n", "\"foo bar\""]
        );
    }

    #[test]
    fn tab_escape_substitutes_inside_quotes() {
        assert_eq!(
            tokenize(r#"echo "hi\tthere""#).unwrap(),
            vec!["echo", "\"hi\tthere\""]
        );
    }

    #[test]
    fn newline_escape_substitutes() {
        assert_eq!(
            tokenize(r#"echo "a\nb""#).unwrap(),
            vec!["echo", "\"a\nb\""]
        );
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert_eq!(tokenize("").unwrap(), Vec::<String>::new());
        assert_eq!(tokenize("   ").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn lone_quote_reports_position_one() {
        let err = tokenize("\"").unwrap_err();
        assert_eq!(err.to_string(), "unterminated quote at 1");
    }

    #[test]
    fn unterminated_quote_reports_open_position() {
        let err = tokenize("echo \"abc").unwrap_err();
        assert_eq!(err.to_string(), "unterminated quote at 6");
    }

    #[test]
    fn trailing_backslash_is_an_error() {
        let err = tokenize("echo abc\\").unwrap_err();
        assert_eq!(err.to_string(), "unterminated control character at 9");
    }

    #[test]
    fn smart_quotes_normalize_to_straight() {
        assert_eq!(
            tokenize("echo \u{201C}foo bar\u{201D}").unwrap(),
            vec!["echo", "\"foo bar\""]
        );
        assert_eq!(
            tokenize("echo \u{201E}low nine\u{201D}").unwrap(),
            vec!["echo", "\"low nine\""]
        );
    }

    #[test]
    fn single_quotes_are_their_own_flavor() {
        assert_eq!(
            tokenize("echo 'foo bar'").unwrap(),
            vec!["echo", "'foo bar'"]
        );
    }

    #[test]
    fn quoted_round_trip_preserves_content() {
        // The quoted substring survives byte-for-byte (modulo the
        // smart-to-straight normalization of the delimiters).
        let tokens = tokenize("say \u{201C}a b  c\u{201D}").unwrap();
        assert_eq!(&tokens[1][1..tokens[1].len() - 1], "a b  c");
    }
}
