use chrono::{DateTime, Utc};
use fabula_utils::types::{
    InterpretationQuality, JobId, JobStatus, PhaseId, PhaseStatus, Usage, content_hash,
};
use serde::{Deserialize, Serialize};

/// Durable state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub title: String,
    pub source_text: String,
    /// BLAKE3 of `source_text`.
    pub source_hash: String,
    /// Profile set the job was created with.
    pub profile: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub total_tokens: u64,
    /// Phases this job runs, in order. Fixed at creation.
    pub phases_enabled: Vec<PhaseId>,
}

impl JobRecord {
    #[must_use]
    pub fn new(
        job_id: JobId,
        title: impl Into<String>,
        source_text: impl Into<String>,
        profile: impl Into<String>,
        phases_enabled: Vec<PhaseId>,
    ) -> Self {
        let source_text = source_text.into();
        let now = Utc::now();
        Self {
            job_id,
            title: title.into(),
            source_hash: content_hash(&source_text),
            source_text,
            profile: profile.into(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            total_cost_usd: 0.0,
            total_tokens: 0,
            phases_enabled,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether `phase` is part of this job's graph.
    #[must_use]
    pub fn runs(&self, phase: PhaseId) -> bool {
        self.phases_enabled.contains(&phase)
    }
}

/// Durable state of one phase within a job. Immutable once `completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub name: PhaseId,
    pub ordinal: u32,
    pub depends_on: Vec<PhaseId>,
    pub status: PhaseStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub interpretation: Option<InterpretationQuality>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Times this phase has been marked `running`.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseRecord {
    #[must_use]
    pub fn pending(phase: PhaseId) -> Self {
        Self {
            name: phase,
            ordinal: phase.ordinal(),
            depends_on: phase.deps().to_vec(),
            status: PhaseStatus::Pending,
            output: None,
            error: None,
            duration_ms: None,
            model: None,
            provider: None,
            cost_usd: 0.0,
            usage: Usage::default(),
            degraded: false,
            interpretation: None,
            warnings: Vec::new(),
            attempts: 0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Copy marked `running` for a fresh attempt.
    #[must_use]
    pub fn begin_attempt(&self) -> Self {
        Self {
            status: PhaseStatus::Running,
            error: None,
            attempts: self.attempts.saturating_add(1),
            started_at: Some(Utc::now()),
            completed_at: None,
            ..self.clone()
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.status, PhaseStatus::Completed)
    }
}
