//! Phase orchestration for fabula.
//!
//! [`OrchestratorHandle`] is the entry point: it creates or resumes a job
//! and drives it through [`PhaseOrchestrator`]. Progress is reported to a
//! [`TelemetrySink`] and summarized in a [`JobResult`].

mod cancel;
mod error;
mod orchestrator;
mod result;
mod telemetry;

pub use cancel::CancellationFlag;
pub use error::EngineError;
pub use orchestrator::{
    DEFAULT_RETRIEVE_LIMIT, JobSpec, OrchestratorHandle, PhaseOrchestrator,
    PhaseOrchestratorBuilder,
};
pub use result::{JobResult, PhaseFailure, PhaseState, PhaseSummary};
pub use telemetry::{
    ChannelTelemetry, CollectingTelemetry, NullTelemetry, TelemetryEvent, TelemetryKind,
    TelemetrySink, TelemetryWriter, TracingTelemetry, sink_from_config,
};
