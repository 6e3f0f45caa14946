//! One JSON file per trace under `<root>/<phase>/<id>.json`.
//!
//! Files are written through `write_file_atomic`, so readers never see a
//! partial trace and never need a lock. Unreadable files are skipped.

use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use fabula_utils::atomic_write::write_file_atomic;
use fabula_utils::types::PhaseId;
use tracing::{debug, warn};

use crate::error::MemoryError;
use crate::trace::{
    QUALITY_THRESHOLD, ReasoningMemory, ReasoningTrace, StoreOutcome, TraceContent, check_score,
    rank, trace_id,
};

#[derive(Debug, Clone)]
pub struct FileReasoningMemory {
    root: Utf8PathBuf,
}

impl FileReasoningMemory {
    /// `root` is usually `FabulaHome::memory_dir()`; it is created on first store.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn phase_dir(&self, phase: PhaseId) -> Utf8PathBuf {
        self.root.join(phase.as_str())
    }

    fn trace_path(&self, phase: PhaseId, id: &str) -> Utf8PathBuf {
        self.phase_dir(phase).join(format!("{id}.json"))
    }

    fn read_trace(path: &Utf8Path) -> Result<ReasoningTrace, MemoryError> {
        let raw = fs::read_to_string(path).map_err(|source| MemoryError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| MemoryError::Corrupted {
            path: path.to_owned(),
            source,
        })
    }

    fn write_trace(path: &Utf8Path, trace: &ReasoningTrace) -> Result<(), MemoryError> {
        let json = serde_json::to_string_pretty(trace).map_err(|source| MemoryError::Corrupted {
            path: path.to_owned(),
            source,
        })?;
        write_file_atomic(path, &json).map_err(|e| MemoryError::Write {
            path: path.to_owned(),
            reason: format!("{e:#}"),
        })?;
        Ok(())
    }
}

impl ReasoningMemory for FileReasoningMemory {
    fn list(&self, phase: PhaseId) -> Result<Vec<ReasoningTrace>, MemoryError> {
        let dir = self.phase_dir(phase);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(MemoryError::Io { path: dir, source }),
        };

        let mut traces = Vec::new();
        for entry in entries.flatten() {
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.extension() != Some("json") {
                continue;
            }
            match Self::read_trace(&path) {
                Ok(trace) if trace.quality_score >= QUALITY_THRESHOLD => traces.push(trace),
                Ok(_) => {}
                Err(e) => warn!(path = %path, error = %e, "Skipping unreadable trace"),
            }
        }

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
            debug!(phase = %phase, quality, "Trace below threshold, discarded");
            return Ok(StoreOutcome::Discarded { quality });
        }

        let id = trace_id(phase, &content.reasoning);
        let path = self.trace_path(phase, &id);
        if path.exists() {
            return Ok(StoreOutcome::Duplicate { id });
        }

        let trace = ReasoningTrace::new(phase, content, quality);
        Self::write_trace(&path, &trace)?;
        debug!(phase = %phase, id = %id, quality, "Stored reasoning trace");
        Ok(StoreOutcome::Stored { id })
    }

    fn record_usage(&self, phase: PhaseId, id: &str) -> Result<(), MemoryError> {
        let path = self.trace_path(phase, id);
        let mut trace = Self::read_trace(&path)?;
        trace.usage_count = trace.usage_count.saturating_add(1);
        Self::write_trace(&path, &trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn content(reasoning: &str) -> TraceContent {
        TraceContent {
            reasoning: reasoning.to_string(),
            model: "claude-sonnet-4-5".to_string(),
            job_id: "job-1".to_string(),
        }
    }

    fn memory() -> (TempDir, FileReasoningMemory) {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("memory")).unwrap();
        (temp, FileReasoningMemory::new(root))
    }

    #[test]
    fn test_low_quality_is_discarded() {
        let (_temp, memory) = memory();
        let outcome = memory.store(PhaseId::DnaExtraction, content("meh"), 7).unwrap();
        assert_eq!(outcome, StoreOutcome::Discarded { quality: 7 });
        assert!(memory.list(PhaseId::DnaExtraction).unwrap().is_empty());
    }

    #[test]
    fn test_store_and_retrieve_ranked() {
        let (_temp, memory) = memory();
        memory.store(PhaseId::DnaExtraction, content("good"), 8).unwrap();
        memory.store(PhaseId::DnaExtraction, content("great"), 10).unwrap();
        memory.store(PhaseId::CharacterProfiles, content("other phase"), 10).unwrap();

        let traces = memory.retrieve(PhaseId::DnaExtraction, 5).unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].content.reasoning, "great");
        assert_eq!(traces[1].content.reasoning, "good");
        assert_eq!(traces[0].usage_count, 1);

        let listed = memory.list(PhaseId::DnaExtraction).unwrap();
        assert_eq!(listed[0].usage_count, 1, "retrieve persisted the usage bump");
    }

    #[test]
    fn test_retrieve_respects_limit() {
        let (_temp, memory) = memory();
        for i in 0..4 {
            memory
                .store(PhaseId::NarrativeStructure, content(&format!("trace {i}")), 9)
                .unwrap();
        }
        assert_eq!(memory.retrieve(PhaseId::NarrativeStructure, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_content_stored_once() {
        let (_temp, memory) = memory();
        let first = memory.store(PhaseId::DnaExtraction, content("same"), 9).unwrap();
        let second = memory.store(PhaseId::DnaExtraction, content("same"), 10).unwrap();
        assert!(matches!(first, StoreOutcome::Stored { .. }));
        assert!(matches!(second, StoreOutcome::Duplicate { .. }));
        assert_eq!(memory.list(PhaseId::DnaExtraction).unwrap()[0].quality_score, 9);
    }

    #[test]
    fn test_corrupted_file_is_skipped() {
        let (_temp, memory) = memory();
        memory.store(PhaseId::DnaExtraction, content("fine"), 9).unwrap();
        fs::write(memory.phase_dir(PhaseId::DnaExtraction).join("bad.json"), "{oops").unwrap();
        assert_eq!(memory.list(PhaseId::DnaExtraction).unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_range_score_rejected() {
        let (_temp, memory) = memory();
        let err = memory.store(PhaseId::DnaExtraction, content("x"), 11).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidScore { score: 11 }));
    }
}
