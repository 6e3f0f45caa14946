//! `fabula memory list`.

use serde_json::json;

use fabula_config::Config;
use fabula_memory::{FileReasoningMemory, ReasoningMemory, ReasoningTrace};
use fabula_utils::error::ConfigError;
use fabula_utils::types::PhaseId;

use super::render::emit_json;
use crate::error::FabulaError;

/// Characters of reasoning shown per trace in the human listing.
const PREVIEW_CHARS: usize = 72;

pub fn execute_memory_list_command(
    phase: &str,
    limit: usize,
    json: bool,
    config: &Config,
) -> Result<(), FabulaError> {
    let phase: PhaseId = phase.parse().map_err(|reason: String| {
        FabulaError::Config(ConfigError::InvalidValue {
            key: "phase".to_string(),
            value: reason,
        })
    })?;

    let memory = FileReasoningMemory::new(config.home().memory_dir());
    let mut traces = memory.list(phase)?;
    traces.truncate(limit);

    if json {
        let rows: Vec<_> = traces
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "phase_name": t.phase_name,
                    "quality_score": t.quality_score,
                    "usage_count": t.usage_count,
                    "created_at": t.created_at,
                    "model": t.content.model,
                    "job_id": t.content.job_id,
                })
            })
            .collect();
        println!("{}", emit_json(&rows)?);
        return Ok(());
    }

    if traces.is_empty() {
        println!("No reasoning traces stored for {phase}");
        return Ok(());
    }
    for trace in &traces {
        println!("{}", format_trace(trace));
    }
    Ok(())
}

fn format_trace(trace: &ReasoningTrace) -> String {
    let first_line = trace.content.reasoning.lines().next().unwrap_or_default();
    let mut preview: String = first_line.chars().take(PREVIEW_CHARS).collect();
    if first_line.chars().count() > PREVIEW_CHARS {
        preview.push('…');
    }
    format!(
        "{}  q={:<2} used={:<3} {}  {}",
        &trace.id[..trace.id.len().min(12)],
        trace.quality_score,
        trace.usage_count,
        trace.created_at.format("%Y-%m-%d"),
        preview
    )
}
