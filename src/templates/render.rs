//! `$name` / `${name}` placeholder substitution
//!
//! Placeholders are ASCII identifiers (`[A-Za-z_][A-Za-z0-9_]*`). `$$` is a
//! literal dollar sign. Every placeholder must be bound; any other use of `$`
//! is an error.

use super::TemplateError;
use std::collections::HashMap;

/// Substitute placeholders in `template` from `values`
pub fn render(template: &str, values: &HashMap<String, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        let (name, tail) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) if is_identifier(&braced[..end]) => (&braced[..end], &braced[end + 1..]),
                _ => return Err(invalid_at(template, rest, pos)),
            }
        } else {
            let len = identifier_len(after);
            if len == 0 {
                return Err(invalid_at(template, rest, pos));
            }
            (&after[..len], &after[len..])
        };

        let value = values
            .get(name)
            .ok_or_else(|| TemplateError::MissingPlaceholder(name.to_string()))?;
        out.push_str(value);
        rest = tail;
    }

    out.push_str(rest);
    Ok(out)
}

fn identifier_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && identifier_len(s) == s.len()
}

/// Error naming the byte offset of the offending `$` in the whole template
fn invalid_at(template: &str, rest: &str, pos: usize) -> TemplateError {
    let offset = template.len() - rest.len() + pos;
    TemplateError::InvalidPlaceholder(offset)
}
