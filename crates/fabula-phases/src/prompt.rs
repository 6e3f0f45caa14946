//! Prompt fragments shared by the text phases.

use fabula_interpreter::StructuredRecord;
use fabula_memory::ReasoningTrace;

/// Appended to every text phase's system prompt.
pub const JSON_OUTPUT_RULES: &str = "

OUTPUT RULES:
1. Respond with exactly one JSON object and nothing else.
2. Do not wrap the object in prose. A ```json fence is tolerated but not required.
3. Use the field names shown in the schema exactly; omit nothing that is marked required.
4. Use plain JSON: double-quoted strings, no comments, no trailing commas.";

/// Longest trace excerpt injected into a prompt, in characters.
pub const MAX_TRACE_CHARS: usize = 4000;

/// Render dependency records as labelled, pretty-printed JSON blocks.
pub fn render_records<'a>(records: impl IntoIterator<Item = &'a StructuredRecord>) -> String {
    let mut out = String::new();
    for record in records {
        let body = serde_json::to_string_pretty(&record.to_value()).unwrap_or_default();
        out.push_str(&format!("## {}\n```json\n{body}\n```\n\n", record.phase()));
    }
    out
}

/// Render retrieved traces as worked examples. Empty when there are none.
pub fn render_traces(traces: &[ReasoningTrace]) -> String {
    if traces.is_empty() {
        return String::new();
    }

    let mut out = String::from(
        "# Reference reasoning\n\nThe following reasoning produced high-quality results for this step in earlier runs. Use it as guidance on approach, not as content.\n\n",
    );
    for (idx, trace) in traces.iter().enumerate() {
        let excerpt: String = trace.content.reasoning.chars().take(MAX_TRACE_CHARS).collect();
        out.push_str(&format!(
            "## Example {} (quality {}/10)\n{}\n\n",
            idx + 1,
            trace.quality_score,
            excerpt.trim()
        ));
    }
    out
}
