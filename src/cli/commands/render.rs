//! Human and JSON rendering of command output.

use anyhow::Context;
use serde::Serialize;

use fabula_engine::{JobResult, PhaseSummary};

use crate::error::FabulaError;

/// Emit `value` as canonical JSON (RFC 8785) for stable, diffable output.
pub fn emit_json<T: Serialize>(value: &T) -> Result<String, FabulaError> {
    let json_value = serde_json::to_value(value).context("Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .context("Failed to canonicalize JSON using JCS")?;
    let json = String::from_utf8(json_bytes).context("JCS output contained invalid UTF-8")?;
    Ok(json)
}

fn phase_row(summary: &PhaseSummary) -> String {
    let mut row = format!(
        "  {}  {:<20} {:<16}",
        summary.name.ordinal(),
        summary.name.as_str(),
        summary.state().as_str()
    );
    if summary.attempts > 0 {
        row.push_str(&format!(
            " {} attempt{}",
            summary.attempts,
            if summary.attempts == 1 { "" } else { "s" }
        ));
    }
    if let Some(ms) = summary.duration_ms {
        row.push_str(&format!("  {ms} ms"));
    }
    if summary.cost_usd > 0.0 {
        row.push_str(&format!("  ${:.4}", summary.cost_usd));
    }
    row
}

/// Multi-line status table for a job.
pub fn format_job_result(result: &JobResult) -> String {
    let mut out = format!(
        "Job {} ({}) [{}]: {}\n",
        result.job_id,
        result.title,
        result.profile,
        result.headline()
    );

    for summary in &result.phases {
        out.push_str(&phase_row(summary));
        out.push('\n');
        if let Some(error) = &summary.error {
            out.push_str(&format!("       error: {error}\n"));
        }
        for warning in &summary.warnings {
            out.push_str(&format!("       warning: {warning}\n"));
        }
    }

    for note in &result.notes {
        out.push_str(&format!("note: {note}\n"));
    }
    out.push_str(&format!(
        "total: {} tokens, ${:.4}\n",
        result.total_tokens, result.total_cost_usd
    ));
    out
}

pub fn print_job_result(result: &JobResult) {
    print!("{}", format_job_result(result));
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabula_checkpoint::{JobRecord, PhaseRecord};
    use fabula_utils::types::{JobId, JobStatus, PhaseId, PhaseStatus};

    fn result() -> JobResult {
        let mut job = JobRecord::new(
            JobId::parse("alpha").unwrap(),
            "Alpha",
            "text",
            "baseline",
            PhaseId::ALL.to_vec(),
        );
        job.status = JobStatus::Completed;
        let phases: Vec<PhaseRecord> = PhaseId::ALL
            .iter()
            .map(|p| PhaseRecord {
                status: PhaseStatus::Completed,
                attempts: 1,
                degraded: *p == PhaseId::CharacterProfiles,
                warnings: if *p == PhaseId::CharacterProfiles {
                    vec!["output was repaired".to_string()]
                } else {
                    Vec::new()
                },
                ..PhaseRecord::pending(*p)
            })
            .collect();
        JobResult::snapshot(&job, &phases)
    }

    #[test]
    fn test_table_lists_every_phase_with_state() {
        let text = format_job_result(&result());
        assert!(text.starts_with("Job alpha (Alpha) [baseline]: done, 1 degraded phase(s)"));
        assert!(text.contains("dna_extraction"));
        assert!(text.contains("done (degraded)"));
        assert!(text.contains("warning: output was repaired"));
        assert!(text.contains("1 attempt"));
    }

    #[test]
    fn test_json_is_canonical() {
        let json = emit_json(&result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["phases"].as_array().unwrap().len(), 5);
        // canonical form sorts keys
        assert!(json.find("\"cancelled\"").unwrap() < json.find("\"job_id\"").unwrap());
    }
}
