//! Bounded repair of truncated JSON.
//!
//! Only appends and a single trailing-comma removal are ever performed:
//! close an unterminated string, drop a dangling comma, then close every
//! open container in nesting order. Anything else (mismatched closers,
//! stray text) is left to the safe-default path.

/// What [`repair_json`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    pub text: String,
    pub closed_string: bool,
    pub dropped_trailing_comma: bool,
    /// Closers appended, in order.
    pub appended: String,
}

impl Repair {
    /// Human-readable summary for phase warnings.
    pub fn describe(&self) -> String {
        let mut steps = Vec::new();
        if self.closed_string {
            steps.push("closed an unterminated string".to_string());
        }
        if self.dropped_trailing_comma {
            steps.push("dropped a trailing comma".to_string());
        }
        if !self.appended.is_empty() {
            steps.push(format!("appended '{}'", self.appended));
        }
        steps.join(", ")
    }
}

/// Attempt to complete a truncated JSON document.
///
/// Returns `None` when the input is not repairable by appending (a
/// closer that does not match its opener) or needs no repair at all.
pub fn repair_json(input: &str) -> Option<Repair> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in input.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
            }
            _ => {}
        }
    }

    let mut text = input.trim_end().to_string();
    let closed_string = in_string;
    if closed_string {
        // A dangling escape would swallow the closing quote.
        if escaped {
            text.pop();
        }
        text.push('"');
    }

    let mut dropped_trailing_comma = false;
    if !closed_string && text.ends_with(',') {
        text.pop();
        text.truncate(text.trim_end().len());
        dropped_trailing_comma = true;
    }

    let appended: String = stack.iter().rev().collect();
    if !closed_string && !dropped_trailing_comma && appended.is_empty() {
        return None;
    }
    text.push_str(&appended);

    Some(Repair {
        text,
        closed_string,
        dropped_trailing_comma,
        appended,
    })
}
