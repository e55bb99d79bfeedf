// src/generate/partial_json.rs
//! Best-effort parsing of a JSON document that is still being streamed.
//!
//! Open strings, arrays and objects are closed; a dangling member after the
//! last comma is dropped if closing alone does not yield valid JSON.

use serde_json::Value;

/// Strip a surrounding markdown code fence, if any.
pub fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Strict parse of a finished document.
pub fn parse_complete(text: &str) -> Option<Value> {
    serde_json::from_str(strip_fences(text)).ok()
}

/// Parse a possibly truncated document.
pub fn parse_partial(text: &str) -> Option<Value> {
    let t = strip_fences(text);
    if t.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<Value>(t) {
        return Some(v);
    }
    let mut cut = t.len();
    for _ in 0..2 {
        let (closed, last_comma) = close_open_structures(&t[..cut]);
        if let Ok(v) = serde_json::from_str::<Value>(&closed) {
            return Some(v);
        }
        cut = last_comma?;
    }
    None
}

/// Returns the closed candidate and the byte offset of the last comma that
/// sits outside a string.
fn close_open_structures(s: &str) -> (String, Option<usize>) {
    let mut closers: Vec<char> = Vec::new();
    let mut in_str = false;
    let mut escaped = false;
    let mut last_comma = None;

    for (i, c) in s.char_indices() {
        if in_str {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_str = false;
            }
            continue;
        }
        match c {
            '"' => in_str = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            ',' => last_comma = Some(i),
            _ => {}
        }
    }

    let mut out = if in_str { s.to_string() } else { s.trim_end().to_string() };
    if in_str {
        if escaped {
            out.pop();
        }
        out.push('"');
    } else if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    }
    for closer in closers.iter().rev() {
        out.push(*closer);
    }
    (out, last_comma)
}
