use chrono::{DateTime, Utc};
use fabula_utils::types::{PhaseId, content_hash};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MemoryError;

/// Minimum quality for a trace to be kept or returned.
pub const QUALITY_THRESHOLD: u8 = 8;

pub const MAX_QUALITY: u8 = 10;

/// What a trace records about the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContent {
    pub reasoning: String,
    pub model: String,
    pub job_id: String,
}

/// A stored reasoning trace. Only `usage_count` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub id: String,
    pub phase_name: PhaseId,
    pub content: TraceContent,
    pub quality_score: u8,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

impl ReasoningTrace {
    #[must_use]
    pub fn new(phase: PhaseId, content: TraceContent, quality_score: u8) -> Self {
        Self {
            id: trace_id(phase, &content.reasoning),
            phase_name: phase,
            content,
            quality_score,
            usage_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Content-addressed id: identical reasoning for a phase is stored once.
#[must_use]
pub fn trace_id(phase: PhaseId, reasoning: &str) -> String {
    content_hash(&format!("{}\n{}", phase.as_str(), reasoning))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored { id: String },
    /// Below [`QUALITY_THRESHOLD`]; nothing was written.
    Discarded { quality: u8 },
    /// A trace with the same id already exists.
    Duplicate { id: String },
}

/// Order by quality, newest first within equal quality.
pub(crate) fn rank(traces: &mut [ReasoningTrace]) {
    traces.sort_by(|a, b| {
        b.quality_score
            .cmp(&a.quality_score)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Phase-keyed store of high-quality reasoning traces.
///
/// Matching is by phase only; there is no similarity search over content.
pub trait ReasoningMemory: Send + Sync {
    /// All eligible traces for `phase`, ranked. Does not touch usage counters.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError` when the backing store cannot be read.
    fn list(&self, phase: PhaseId) -> Result<Vec<ReasoningTrace>, MemoryError>;

    /// Persist a trace if `quality >= QUALITY_THRESHOLD`.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError` when the score is out of range or the write fails.
    fn store(
        &self,
        phase: PhaseId,
        content: TraceContent,
        quality: u8,
    ) -> Result<StoreOutcome, MemoryError>;

    /// Increment the usage counter of one trace.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError` when the trace cannot be updated.
    fn record_usage(&self, phase: PhaseId, id: &str) -> Result<(), MemoryError>;

    /// Top `limit` traces for `phase`. Usage counters are bumped
    /// best-effort; a failed increment does not fail retrieval.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError` when the backing store cannot be read.
    fn retrieve(&self, phase: PhaseId, limit: usize) -> Result<Vec<ReasoningTrace>, MemoryError> {
        let mut traces = self.list(phase)?;
        traces.truncate(limit);
        for trace in &mut traces {
            match self.record_usage(phase, &trace.id) {
                Ok(()) => trace.usage_count += 1,
                Err(e) => debug!(id = %trace.id, error = %e, "Failed to bump trace usage"),
            }
        }
        Ok(traces)
    }
}

pub(crate) fn check_score(quality: u8) -> Result<(), MemoryError> {
    if quality > MAX_QUALITY {
        return Err(MemoryError::InvalidScore { score: quality });
    }
    Ok(())
}
