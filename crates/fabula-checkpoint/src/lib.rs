//! Durable job and phase checkpoints for fabula.
//!
//! A job survives restarts through its checkpoint: one job record plus one
//! record per enabled phase. Completed phases are immutable, so a resumed
//! job never redoes them.

mod error;
mod file;
mod memory;
mod records;
mod store;

pub use error::StoreError;
pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use records::{JobRecord, PhaseRecord};
pub use store::{CheckpointStore, JobGuard};
