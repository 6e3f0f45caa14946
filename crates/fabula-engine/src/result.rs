use fabula_checkpoint::{JobRecord, PhaseRecord};
use fabula_llm::GatewayError;
use fabula_utils::types::{InterpretationQuality, JobId, JobStatus, PhaseId, PhaseStatus};
use serde::Serialize;

/// Coarse per-phase state for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Pending,
    Running,
    Done,
    /// Completed with a repaired or defaulted record.
    DoneDegraded,
    Failed,
}

impl PhaseState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::DoneDegraded => "done (degraded)",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub name: PhaseId,
    pub status: PhaseStatus,
    pub degraded: bool,
    pub interpretation: Option<InterpretationQuality>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: Option<u64>,
    pub cost_usd: f64,
    pub warnings: Vec<String>,
}

impl PhaseSummary {
    #[must_use]
    pub fn state(&self) -> PhaseState {
        match self.status {
            PhaseStatus::Pending => PhaseState::Pending,
            PhaseStatus::Running => PhaseState::Running,
            PhaseStatus::Failed => PhaseState::Failed,
            PhaseStatus::Completed if self.degraded => PhaseState::DoneDegraded,
            PhaseStatus::Completed => PhaseState::Done,
        }
    }
}

impl From<&PhaseRecord> for PhaseSummary {
    fn from(record: &PhaseRecord) -> Self {
        Self {
            name: record.name,
            status: record.status,
            degraded: record.degraded,
            interpretation: record.interpretation,
            error: record.error.clone(),
            attempts: record.attempts,
            duration_ms: record.duration_ms,
            cost_usd: record.cost_usd,
            warnings: record.warnings.clone(),
        }
    }
}

/// Why the job halted at a phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseFailure {
    pub phase: PhaseId,
    pub message: String,
    /// The gateway error, when the failure came from a model call.
    #[serde(skip)]
    pub gateway: Option<GatewayError>,
}

/// Outcome of one orchestrator run, or a snapshot of a stored job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub title: String,
    pub profile: String,
    pub status: JobStatus,
    pub phases: Vec<PhaseSummary>,
    pub failure: Option<PhaseFailure>,
    /// The run stopped between phases because cancellation was requested.
    pub cancelled: bool,
    /// Phases executed (not reused) by this run.
    pub executed: Vec<PhaseId>,
    /// Job-level notes such as interrupted phases or a changed source.
    pub notes: Vec<String>,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
}

impl JobResult {
    /// Snapshot of a stored job with no run attached.
    #[must_use]
    pub fn snapshot(job: &JobRecord, phases: &[PhaseRecord]) -> Self {
        let failure = phases
            .iter()
            .find(|p| p.status == PhaseStatus::Failed)
            .map(|p| PhaseFailure {
                phase: p.name,
                message: p.error.clone().unwrap_or_default(),
                gateway: None,
            });
        Self {
            job_id: job.job_id.clone(),
            title: job.title.clone(),
            profile: job.profile.clone(),
            status: job.status,
            phases: phases.iter().map(PhaseSummary::from).collect(),
            failure,
            cancelled: false,
            executed: Vec::new(),
            notes: Vec::new(),
            total_cost_usd: job.total_cost_usd,
            total_tokens: job.total_tokens,
        }
    }

    /// The job reached `completed`, degraded phases included.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }

    #[must_use]
    pub fn degraded_phases(&self) -> Vec<PhaseId> {
        self.phases
            .iter()
            .filter(|p| p.state() == PhaseState::DoneDegraded)
            .map(|p| p.name)
            .collect()
    }

    #[must_use]
    pub fn failed_phase(&self) -> Option<PhaseId> {
        self.failure.as_ref().map(|f| f.phase)
    }

    #[must_use]
    pub fn phase(&self, phase: PhaseId) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.name == phase)
    }

    /// One-line description: running, done, done with degraded phases, or
    /// failed at phase N.
    #[must_use]
    pub fn headline(&self) -> String {
        if let Some(failure) = &self.failure
            && self.status == JobStatus::Failed
        {
            return format!(
                "failed at phase {} ({})",
                failure.phase.ordinal(),
                failure.phase
            );
        }
        match self.status {
            JobStatus::Completed => {
                let degraded = self.degraded_phases();
                if degraded.is_empty() {
                    "done".to_string()
                } else {
                    format!("done, {} degraded phase(s)", degraded.len())
                }
            }
            JobStatus::Pending if self.cancelled => "cancelled (resumable)".to_string(),
            status => status.as_str().to_string(),
        }
    }
}
