//! Environment file parsing and variable substitution.
//!
//! `.env` files use standard dotenv semantics. Substitution of `${VAR}` and
//! `$VAR` is applied to the raw compose text before compilation; undefined
//! variables expand to the empty string and `$$` escapes a literal dollar.

use crate::error::{DockgeacError, Result};
use std::collections::BTreeMap;

/// Parse env text as `KEY=VALUE` lines.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is
/// tolerated, and matching surrounding quotes are stripped from values.
/// Lines without `=` are ignored here; [`validate`] rejects them.
pub fn parse(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    vars
}

/// Reject env text containing a non-comment line with no `=`.
pub fn validate(text: &str) -> Result<()> {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if !line.contains('=') {
            return Err(DockgeacError::Validation(format!(
                "Invalid .env line (expected KEY=VALUE): {}",
                line
            )));
        }
    }
    Ok(())
}

/// Apply `${VAR}` and `$VAR` substitution to `text`.
pub fn substitute(text: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            // "$$" escapes a literal dollar
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '{')) => {
                let rest = &text[i + 2..];
                match rest.find('}') {
                    Some(end) => {
                        let name = &rest[..end];
                        out.push_str(vars.get(name).map(String::as_str).unwrap_or(""));
                        for _ in 0..name.len() + 2 {
                            chars.next();
                        }
                    }
                    // Unterminated "${" passes through untouched
                    None => out.push(c),
                }
            }
            Some((_, next)) if is_var_start(*next) => {
                let rest = &text[i + 1..];
                let len =
                    rest.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '_').count();
                let name = &rest[..len];
                out.push_str(vars.get(name).map(String::as_str).unwrap_or(""));
                for _ in 0..len {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn is_var_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}
