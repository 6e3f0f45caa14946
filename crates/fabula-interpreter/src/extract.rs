//! Locating the JSON object inside a free-text model response.

/// Strip a surrounding markdown code fence, if any.
///
/// Takes the body of the first fenced block; an unterminated fence (a
/// truncated response) yields everything after the opening line.
pub fn strip_code_fences(raw: &str) -> &str {
    let Some(start) = raw.find("```") else {
        return raw.trim();
    };
    let after_ticks = &raw[start + 3..];
    // Skip the info string (`json`, `JSON`, ...) on the opening line.
    let body = match after_ticks.find('\n') {
        Some(newline) => &after_ticks[newline + 1..],
        None => after_ticks,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Result of scanning for the outermost JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction<'a> {
    /// A balanced `{ ... }` span.
    Complete(&'a str),
    /// An opening brace that is never closed; the text runs to the end.
    Truncated(&'a str),
    NotFound,
}

/// Find the outermost JSON object, skipping any prose around it.
///
/// String contents are honored, so braces inside string values do not
/// affect nesting.
pub fn extract_json_object(text: &str) -> Extraction<'_> {
    let Some(start) = text.find('{') else {
        return Extraction::NotFound;
    };
    let candidate = &text[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in candidate.char_indices() {
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
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Extraction::Complete(&candidate[..=idx]);
                }
            }
            _ => {}
        }
    }

    Extraction::Truncated(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("Here:\n```\n{}\n```\nDone"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_unterminated_fence_keeps_body() {
        assert_eq!(strip_code_fences("```json\n{\"a\":"), "{\"a\":");
    }

    #[test]
    fn test_extract_skips_prose_and_trailing_text() {
        let text = "Sure! {\"a\": {\"b\": \"}\"}} Hope this helps {x}";
        assert_eq!(
            extract_json_object(text),
            Extraction::Complete("{\"a\": {\"b\": \"}\"}}")
        );
    }

    #[test]
    fn test_extract_truncated() {
        assert_eq!(
            extract_json_object("x {\"a\": [1, 2"),
            Extraction::Truncated("{\"a\": [1, 2")
        );
        assert_eq!(extract_json_object("no json here"), Extraction::NotFound);
    }

    #[test]
    fn test_escaped_quotes_do_not_end_strings() {
        let text = r#"{"a": "say \"}\" now"}"#;
        assert_eq!(extract_json_object(text), Extraction::Complete(text));
    }
}
