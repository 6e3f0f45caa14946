//! Reasoning memory for fabula.
//!
//! Reasoning traces from well-interpreted phase runs are scored with
//! [`TraceScorer`]; those scoring at least [`QUALITY_THRESHOLD`] are kept
//! and the best of them are injected into later prompts for the same phase.

mod error;
mod file;
mod in_memory;
mod scorer;
mod trace;

pub use error::MemoryError;
pub use file::FileReasoningMemory;
pub use in_memory::InMemoryReasoningMemory;
pub use scorer::TraceScorer;
pub use trace::{
    MAX_QUALITY, QUALITY_THRESHOLD, ReasoningMemory, ReasoningTrace, StoreOutcome, TraceContent,
    trace_id,
};
