//! fabula - resumable multi-phase narrative analysis
//!
//! A story's source text runs through five dependent phases:
//!
//! | # | Phase | Depends on |
//! |---|-------|------------|
//! | 1 | `dna_extraction` | - |
//! | 2 | `character_profiles` | 1 |
//! | 3 | `narrative_structure` | 1, 2 |
//! | 4 | `production_plan` | 1, 2, 3 |
//! | 5 | `cover_art` (image) | 1, 4 |
//!
//! Every phase output is checkpointed before dependents run, so a failed or
//! interrupted job resumes at the first incomplete phase. Malformed model
//! output is repaired or replaced by a safe default and the phase is marked
//! degraded instead of failing the job.
//!
//! fabula can be used in two ways:
//! - **CLI**: `fabula run <job> --source story.txt`
//! - **Library**: build an [`OrchestratorHandle`] and call
//!   [`OrchestratorHandle::start_or_resume`]
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use fabula::{CancellationFlag, Config, JobId, JobSpec, OrchestratorHandle, TracingTelemetry};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let handle = OrchestratorHandle::from_config(
//!     &config,
//!     Arc::new(TracingTelemetry),
//!     CancellationFlag::new(),
//! )?;
//! let spec = JobSpec::new(JobId::parse("alpha")?, "It was a dark and stormy night...")
//!     .with_title("Alpha");
//! let result = handle.start_or_resume(spec).await?;
//! println!("{}", result.headline());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod error;

pub use error::FabulaError;

pub use fabula_config::{CliArgs, Config, ModelProfile, ProfileSet};
pub use fabula_engine::{
    CancellationFlag, EngineError, JobResult, JobSpec, OrchestratorHandle, PhaseOrchestrator,
    PhaseState, PhaseSummary, TelemetryEvent, TelemetryKind, TelemetrySink, TracingTelemetry,
};
pub use fabula_interpreter::StructuredRecord;
pub use fabula_utils::exit_codes::ExitCode;
pub use fabula_utils::types::{InterpretationQuality, JobId, JobStatus, PhaseId, PhaseStatus};
