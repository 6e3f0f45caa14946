//! Entry point for the CLI and embedders.
//!
//! [`OrchestratorHandle::start_or_resume`] is idempotent: the first call
//! creates the job, later calls resume it from its checkpoint.

use std::sync::Arc;

use fabula_checkpoint::{CheckpointStore, FileCheckpointStore, JobRecord};
use fabula_config::Config;
use fabula_llm::ModelGateway;
use fabula_memory::FileReasoningMemory;
use fabula_utils::types::{JobId, PhaseId, content_hash};
use tracing::{info, warn};

use super::PhaseOrchestrator;
use crate::cancel::CancellationFlag;
use crate::error::EngineError;
use crate::result::JobResult;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Inbound command: analyse `source_text` under `job_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub job_id: JobId,
    pub source_text: String,
    /// Defaults to the job id.
    pub title: Option<String>,
    /// Profile set; defaults to the configured default. Ignored on resume.
    pub profile: Option<String>,
}

impl JobSpec {
    #[must_use]
    pub fn new(job_id: JobId, source_text: impl Into<String>) -> Self {
        Self {
            job_id,
            source_text: source_text.into(),
            title: None,
            profile: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Creates jobs on first sight and runs them through a [`PhaseOrchestrator`].
#[derive(Debug)]
pub struct OrchestratorHandle {
    orchestrator: PhaseOrchestrator,
    default_profile: String,
    cover_art: bool,
}

impl OrchestratorHandle {
    /// `cover_art` decides whether newly created jobs include the image phase.
    #[must_use]
    pub fn new(
        orchestrator: PhaseOrchestrator,
        default_profile: impl Into<String>,
        cover_art: bool,
    ) -> Self {
        Self {
            orchestrator,
            default_profile: default_profile.into(),
            cover_art,
        }
    }

    /// Wire file-backed checkpoints, file-backed memory and the HTTP
    /// gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Gateway` if the HTTP client cannot be built.
    pub fn from_config(
        config: &Config,
        telemetry: Arc<dyn TelemetrySink>,
        cancel: CancellationFlag,
    ) -> Result<Self, EngineError> {
        let home = config.home();
        let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(home.clone()));
        let gateway = Arc::new(ModelGateway::from_config(config)?);

        let mut builder = PhaseOrchestrator::builder(store, gateway)
            .telemetry(telemetry)
            .profiles(config.profiles.clone())
            .retrieve_limit(config.memory.retrieve_limit)
            .cancellation(cancel);
        if config.memory.enabled {
            builder = builder.memory(Arc::new(FileReasoningMemory::new(home.memory_dir())));
        }

        Ok(Self::new(
            builder.build(),
            config.defaults.profile.clone(),
            config.pipeline.cover_art,
        ))
    }

    #[must_use]
    pub fn orchestrator(&self) -> &PhaseOrchestrator {
        &self.orchestrator
    }

    /// Create the job if it does not exist, then advance it.
    ///
    /// On resume the stored source text and profile are kept; a different
    /// source is reported as a note and a warning, not an error.
    ///
    /// # Errors
    ///
    /// See [`PhaseOrchestrator::run`]. Also `EngineError::UnknownProfile`
    /// when a new job names a profile set that does not exist.
    pub async fn start_or_resume(&self, spec: JobSpec) -> Result<JobResult, EngineError> {
        let store = self.orchestrator.store();
        let _guard = store.lock_job(&spec.job_id)?;
        let mut notes = Vec::new();

        match store.load_job(&spec.job_id)? {
            Some(job) => {
                if job.source_hash != content_hash(&spec.source_text) {
                    let note = "source text differs from the stored job; keeping the stored source"
                        .to_string();
                    warn!(job_id = %job.job_id, "{note}");
                    self.orchestrator
                        .telemetry()
                        .emit(TelemetryEvent::system_note(&job.job_id, None, note.clone()));
                    notes.push(note);
                }
                if let Some(profile) = &spec.profile
                    && profile != &job.profile
                {
                    let note = format!(
                        "profile '{profile}' ignored; job was created with '{}'",
                        job.profile
                    );
                    warn!(job_id = %job.job_id, "{note}");
                    notes.push(note);
                }
                info!(job_id = %job.job_id, status = %job.status, "Resuming job");
            }
            None => {
                let profile = spec
                    .profile
                    .clone()
                    .unwrap_or_else(|| self.default_profile.clone());
                if !self.orchestrator.has_profile(&profile) {
                    return Err(EngineError::UnknownProfile { profile });
                }
                let phases: Vec<PhaseId> = PhaseId::ALL
                    .into_iter()
                    .filter(|p| self.cover_art || !p.is_image_phase())
                    .collect();
                let title = spec
                    .title
                    .clone()
                    .unwrap_or_else(|| spec.job_id.to_string());
                let job = JobRecord::new(
                    spec.job_id.clone(),
                    title,
                    spec.source_text.clone(),
                    profile,
                    phases,
                );
                store.create_job(&job)?;
                info!(
                    job_id = %job.job_id,
                    profile = %job.profile,
                    phases = job.phases_enabled.len(),
                    "Created job"
                );
            }
        }

        self.orchestrator.run_locked(&spec.job_id, notes).await
    }

    /// Advance an existing job.
    ///
    /// # Errors
    ///
    /// See [`PhaseOrchestrator::run`].
    pub async fn resume(&self, job_id: &JobId) -> Result<JobResult, EngineError> {
        self.orchestrator.run(job_id).await
    }

    /// Read-only snapshot; does not take the job lock.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::JobNotFound` or a store read error.
    pub fn status(&self, job_id: &JobId) -> Result<JobResult, EngineError> {
        let store = self.orchestrator.store();
        let job = store
            .load_job(job_id)?
            .ok_or_else(|| EngineError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        let phases = store.get_phases(job_id)?;
        Ok(JobResult::snapshot(&job, &phases))
    }
}
