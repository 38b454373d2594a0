//! Small lexical helpers shared by the header and URI parsers.

use crate::types::param::Param;

/// RFC 3261 `token` characters
pub fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '-' | '.' | '!' | '%' | '*' | '_' | '+' | '`' | '\'' | '~')
}

/// Splits `input` on `sep`, ignoring separators inside double quotes or
/// angle brackets. Segments are trimmed.
pub fn split_unquoted(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut angle_depth = 0usize;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => angle_depth += 1,
            '>' if !in_quotes && angle_depth > 0 => angle_depth -= 1,
            c if c == sep && !in_quotes && angle_depth == 0 => {
                parts.push(input[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(input[start..].trim());
    parts
}

/// Parses `;name=value;flag` style parameters. Leading `;` is optional.
pub fn parse_params(input: &str) -> Vec<Param> {
    let input = input.trim().trim_start_matches(';');
    if input.is_empty() {
        return Vec::new();
    }
    split_unquoted(input, ';')
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((name, value)) => Param::new(name.trim(), Some(value.trim())),
            None => Param::flag(p.trim()),
        })
        .collect()
}

/// Removes surrounding double quotes and backslash escapes
pub fn unquote(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        let inner = &trimmed[1..trimmed.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    } else {
        trimmed.to_string()
    }
}
