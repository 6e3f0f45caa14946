use std::collections::HashMap;
use std::sync::RwLock;

use fabula_utils::types::PhaseId;

use crate::error::MemoryError;
use crate::trace::{
    QUALITY_THRESHOLD, ReasoningMemory, ReasoningTrace, StoreOutcome, TraceContent, check_score,
    rank, trace_id,
};

/// Process-local reasoning memory for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryReasoningMemory {
    traces: RwLock<HashMap<PhaseId, Vec<ReasoningTrace>>>,
}

impl InMemoryReasoningMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pre-built trace, bypassing the threshold. Test seeding only.
    pub fn insert(&self, trace: ReasoningTrace) {
        self.traces
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(trace.phase_name)
            .or_default()
            .push(trace);
    }
}

impl ReasoningMemory for InMemoryReasoningMemory {
    fn list(&self, phase: PhaseId) -> Result<Vec<ReasoningTrace>, MemoryError> {
        let guard = self.traces.read().unwrap_or_else(|e| e.into_inner());
        let mut traces: Vec<ReasoningTrace> = guard
            .get(&phase)
            .map(|v| {
                v.iter()
                    .filter(|t| t.quality_score >= QUALITY_THRESHOLD)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rank(&mut traces);
        Ok(traces)
    }

    fn store(
        &self,
        phase: PhaseId,
        content: TraceContent,
        quality: u8,
    ) -> Result<StoreOutcome, MemoryError> {
        check_score(quality)?;
        if quality < QUALITY_THRESHOLD {
            return Ok(StoreOutcome::Discarded { quality });
        }

        let id = trace_id(phase, &content.reasoning);
        let mut guard = self.traces.write().unwrap_or_else(|e| e.into_inner());
        let bucket = guard.entry(phase).or_default();
        if bucket.iter().any(|t| t.id == id) {
            return Ok(StoreOutcome::Duplicate { id });
        }
        bucket.push(ReasoningTrace::new(phase, content, quality));
        Ok(StoreOutcome::Stored { id })
    }

    fn record_usage(&self, phase: PhaseId, id: &str) -> Result<(), MemoryError> {
        let mut guard = self.traces.write().unwrap_or_else(|e| e.into_inner());
        if let Some(trace) = guard
            .get_mut(&phase)
            .and_then(|v| v.iter_mut().find(|t| t.id == id))
        {
            trace.usage_count = trace.usage_count.saturating_add(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn content(reasoning: &str) -> TraceContent {
        TraceContent {
            reasoning: reasoning.to_string(),
            model: "m".to_string(),
            job_id: "j".to_string(),
        }
    }

    #[test]
    fn test_ties_prefer_newest() {
        let memory = InMemoryReasoningMemory::new();
        let mut old = ReasoningTrace::new(PhaseId::ProductionPlan, content("old"), 9);
        old.created_at = Utc::now() - Duration::hours(1);
        let new = ReasoningTrace::new(PhaseId::ProductionPlan, content("new"), 9);
        memory.insert(old);
        memory.insert(new);

        let traces = memory.retrieve(PhaseId::ProductionPlan, 1).unwrap();
        assert_eq!(traces[0].content.reasoning, "new");
        assert_eq!(traces[0].usage_count, 1);
    }

    #[test]
    fn test_seeded_low_quality_is_never_returned() {
        let memory = InMemoryReasoningMemory::new();
        memory.insert(ReasoningTrace::new(PhaseId::DnaExtraction, content("weak"), 3));
        assert!(memory.retrieve(PhaseId::DnaExtraction, 2).unwrap().is_empty());
    }

    #[test]
    fn test_threshold_boundary() {
        let memory = InMemoryReasoningMemory::new();
        assert!(matches!(
            memory.store(PhaseId::DnaExtraction, content("a"), 8).unwrap(),
            StoreOutcome::Stored { .. }
        ));
        assert_eq!(
            memory.store(PhaseId::DnaExtraction, content("b"), 7).unwrap(),
            StoreOutcome::Discarded { quality: 7 }
        );
    }
}
