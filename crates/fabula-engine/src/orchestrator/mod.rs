//! Phase orchestrator.
//!
//! Advances one job through its phase graph:
//!
//! 1. acquire the job lock (held for the whole run)
//! 2. load the checkpoint and validate it against the dependency graph
//! 3. for each phase in order: skip if completed, otherwise mark it
//!    `running`, call the gateway, interpret the response and persist the
//!    completed record
//! 4. stop on the first fatal phase error or when cancellation is requested
//!
//! Dependents only ever read outputs that were committed to the checkpoint
//! store, never in-memory state from a previous phase.

mod handle;
mod phase_exec;

pub use handle::{JobSpec, OrchestratorHandle};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use fabula_checkpoint::{CheckpointStore, JobRecord, PhaseRecord};
use fabula_config::ProfileSet;
use fabula_interpreter::StructuredRecord;
use fabula_llm::ModelGateway;
use fabula_memory::{
    QUALITY_THRESHOLD, ReasoningMemory, ReasoningTrace, StoreOutcome, TraceContent, TraceScorer,
};
use fabula_phases::PhaseInputs;
use fabula_utils::logging::{
    log_phase_complete, log_phase_error, log_phase_skipped, log_phase_start, phase_span,
};
use fabula_utils::redaction::redact_secrets;
use fabula_utils::types::{InterpretationQuality, JobId, JobStatus, PhaseId, PhaseStatus};
use tracing::{Instrument, debug, error, info, warn};

use crate::cancel::CancellationFlag;
use crate::error::EngineError;
use crate::result::{JobResult, PhaseFailure, PhaseSummary};
use crate::telemetry::{NullTelemetry, TelemetryEvent, TelemetrySink};

use self::phase_exec::{Fatal, PhaseSuccess};

/// Default number of reasoning traces injected into a prompt.
pub const DEFAULT_RETRIEVE_LIMIT: usize = 2;

/// Runs jobs against a checkpoint store, a model gateway and (optionally)
/// reasoning memory.
///
/// Outside this crate, prefer [`OrchestratorHandle`], which also creates
/// jobs. `run` only advances jobs that already exist.
pub struct PhaseOrchestrator {
    store: Arc<dyn CheckpointStore>,
    gateway: Arc<ModelGateway>,
    memory: Option<Arc<dyn ReasoningMemory>>,
    telemetry: Arc<dyn TelemetrySink>,
    profiles: BTreeMap<String, ProfileSet>,
    scorer: TraceScorer,
    retrieve_limit: usize,
    cancel: CancellationFlag,
}

impl std::fmt::Debug for PhaseOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseOrchestrator")
            .field("profiles", &self.profiles.keys().collect::<Vec<_>>())
            .field("memory", &self.memory.is_some())
            .field("retrieve_limit", &self.retrieve_limit)
            .finish_non_exhaustive()
    }
}

pub struct PhaseOrchestratorBuilder {
    store: Arc<dyn CheckpointStore>,
    gateway: Arc<ModelGateway>,
    memory: Option<Arc<dyn ReasoningMemory>>,
    telemetry: Arc<dyn TelemetrySink>,
    profiles: BTreeMap<String, ProfileSet>,
    scorer: TraceScorer,
    retrieve_limit: usize,
    cancel: CancellationFlag,
}

impl PhaseOrchestratorBuilder {
    #[must_use]
    pub fn memory(mut self, memory: Arc<dyn ReasoningMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replace the built-in profile sets.
    #[must_use]
    pub fn profiles(mut self, profiles: BTreeMap<String, ProfileSet>) -> Self {
        self.profiles = profiles;
        self
    }

    #[must_use]
    pub fn scorer(mut self, scorer: TraceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    #[must_use]
    pub fn retrieve_limit(mut self, limit: usize) -> Self {
        self.retrieve_limit = limit;
        self
    }

    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn build(self) -> PhaseOrchestrator {
        PhaseOrchestrator {
            store: self.store,
            gateway: self.gateway,
            memory: self.memory,
            telemetry: self.telemetry,
            profiles: self.profiles,
            scorer: self.scorer,
            retrieve_limit: self.retrieve_limit,
            cancel: self.cancel,
        }
    }
}

/// Per-run bookkeeping that ends up in the `JobResult`.
#[derive(Default)]
struct RunState {
    notes: Vec<String>,
    executed: Vec<PhaseId>,
    failure: Option<PhaseFailure>,
    cancelled: bool,
}

fn violation(job_id: &JobId, phase: PhaseId, reason: impl Into<String>) -> EngineError {
    EngineError::DependencyViolation {
        job_id: job_id.to_string(),
        phase,
        reason: reason.into(),
    }
}

/// Reject checkpoints that no valid run could have produced.
fn validate_checkpoint(
    job: &JobRecord,
    phases: &BTreeMap<PhaseId, PhaseRecord>,
) -> Result<(), EngineError> {
    for phase in &job.phases_enabled {
        if let Some(dep) = phase.deps().iter().find(|dep| !job.runs(**dep)) {
            return Err(violation(
                &job.job_id,
                *phase,
                format!("depends on {dep}, which is not enabled for this job"),
            ));
        }
    }

    for record in phases.values().filter(|r| r.is_completed()) {
        if record.output.is_none() {
            return Err(violation(
                &job.job_id,
                record.name,
                "marked completed but has no stored output",
            ));
        }
        for dep in record.name.deps() {
            let dep_status = phases.get(dep).map(|r| r.status);
            if dep_status != Some(PhaseStatus::Completed) {
                return Err(violation(
                    &job.job_id,
                    record.name,
                    format!(
                        "marked completed while dependency {dep} is {}",
                        dep_status.map_or("absent", |s| s.as_str())
                    ),
                ));
            }
        }
    }
    Ok(())
}

impl PhaseOrchestrator {
    #[must_use]
    pub fn builder(
        store: Arc<dyn CheckpointStore>,
        gateway: Arc<ModelGateway>,
    ) -> PhaseOrchestratorBuilder {
        PhaseOrchestratorBuilder {
            store,
            gateway,
            memory: None,
            telemetry: Arc::new(NullTelemetry),
            profiles: fabula_config::builtin_profiles(),
            scorer: TraceScorer::default(),
            retrieve_limit: DEFAULT_RETRIEVE_LIMIT,
            cancel: CancellationFlag::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    #[must_use]
    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub(crate) fn telemetry(&self) -> &dyn TelemetrySink {
        self.telemetry.as_ref()
    }

    /// Advance an existing job as far as possible.
    ///
    /// Completed phases are reused, never re-executed. A gateway failure
    /// marks its phase and the job `failed` and is reported in the result;
    /// it is not an `Err`.
    ///
    /// # Errors
    ///
    /// - `EngineError::JobLocked` if another run holds the job
    /// - `EngineError::JobNotFound` if the job was never created
    /// - `EngineError::DependencyViolation` if the checkpoint is inconsistent
    /// - `EngineError::Store` if a checkpoint write fails
    pub async fn run(&self, job_id: &JobId) -> Result<JobResult, EngineError> {
        let _guard = self.store.lock_job(job_id)?;
        self.run_locked(job_id, Vec::new()).await
    }

    /// Body of `run`. The caller must hold the job lock.
    pub(crate) async fn run_locked(
        &self,
        job_id: &JobId,
        notes: Vec<String>,
    ) -> Result<JobResult, EngineError> {
        let mut job = self
            .store
            .load_job(job_id)?
            .ok_or_else(|| EngineError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        let profiles = self
            .profiles
            .get(&job.profile)
            .cloned()
            .ok_or_else(|| EngineError::UnknownProfile {
                profile: job.profile.clone(),
            })?;

        let mut phases: BTreeMap<PhaseId, PhaseRecord> = self
            .store
            .get_phases(job_id)?
            .into_iter()
            .map(|r| (r.name, r))
            .collect();
        let mut run = RunState {
            notes,
            ..RunState::default()
        };

        if let Err(e) = validate_checkpoint(&job, &phases) {
            self.fail_job(&mut job);
            return Err(e);
        }

        for record in phases.values().filter(|r| r.status == PhaseStatus::Running) {
            let note = format!(
                "phase {} was interrupted during an earlier run and will be re-executed",
                record.name
            );
            warn!(job_id = %job_id, phase = %record.name, attempts = record.attempts, "Phase was interrupted");
            self.telemetry
                .emit(TelemetryEvent::system_note(job_id, Some(record.name), note.clone()));
            run.notes.push(note);
        }

        job.status = JobStatus::Running;
        job.touch();
        self.store.update_job(&job)?;

        let mut order = job.phases_enabled.clone();
        order.sort_by_key(PhaseId::ordinal);

        for phase in order {
            let stored = phases.get(&phase).cloned();
            let prior_status = stored.as_ref().map(|r| r.status);
            let current = stored.unwrap_or_else(|| PhaseRecord::pending(phase));

            if current.is_completed() {
                log_phase_skipped(job_id.as_str(), phase.as_str());
                continue;
            }
            if self.cancel.is_cancelled() {
                info!(job_id = %job_id, next_phase = %phase, "Cancellation requested; stopping between phases");
                run.cancelled = true;
                break;
            }

            let inputs = match self.assemble_inputs(job_id, phase, &phases) {
                Ok(inputs) => inputs,
                Err(e) => {
                    self.fail_job(&mut job);
                    return Err(e);
                }
            };

            let running = current.begin_attempt();
            if let Err(e) = self.store.upsert_phase(job_id, &running, prior_status) {
                self.fail_job(&mut job);
                return Err(e.into());
            }
            phases.insert(phase, running.clone());
            log_phase_start(job_id.as_str(), phase.as_str(), running.attempts);

            let started = Instant::now();
            let outcome = self
                .execute_phase(&job, &profiles, &running, inputs, started)
                .instrument(phase_span(job_id.as_str(), phase.as_str()))
                .await;
            run.executed.push(phase);

            match outcome {
                Ok(success) => {
                    if let Err(e) = self.commit_success(&mut job, success, &mut phases) {
                        self.abandon_phase(&mut job, &running, &e);
                        return Err(e);
                    }
                }
                Err(fatal) => match self.commit_failure(&mut job, &running, fatal, started) {
                    Ok((failed, failure)) => {
                        phases.insert(phase, failed);
                        run.failure = Some(failure);
                        break;
                    }
                    Err(e) => {
                        self.abandon_phase(&mut job, &running, &e);
                        return Err(e);
                    }
                },
            }
        }

        if run.failure.is_none() {
            job.status = if run.cancelled {
                JobStatus::Pending
            } else {
                JobStatus::Completed
            };
            job.touch();
            if let Err(e) = self.store.update_job(&job) {
                self.fail_job(&mut job);
                return Err(e.into());
            }
            info!(
                job_id = %job_id,
                status = %job.status,
                total_cost_usd = job.total_cost_usd,
                total_tokens = job.total_tokens,
                "Run finished"
            );
        }

        Ok(JobResult {
            job_id: job.job_id.clone(),
            title: job.title.clone(),
            profile: job.profile.clone(),
            status: job.status,
            phases: phases.values().map(PhaseSummary::from).collect(),
            failure: run.failure,
            cancelled: run.cancelled,
            executed: run.executed,
            notes: run.notes,
            total_cost_usd: job.total_cost_usd,
            total_tokens: job.total_tokens,
        })
    }

    /// Parse committed dependency outputs into records.
    fn assemble_inputs(
        &self,
        job_id: &JobId,
        phase: PhaseId,
        phases: &BTreeMap<PhaseId, PhaseRecord>,
    ) -> Result<PhaseInputs, EngineError> {
        let mut inputs = PhaseInputs::new(phase);
        for dep in phase.deps() {
            let record = phases.get(dep).filter(|r| r.is_completed()).ok_or_else(|| {
                violation(job_id, phase, format!("dependency {dep} is not completed"))
            })?;
            let output = record.output.clone().ok_or_else(|| {
                violation(job_id, phase, format!("dependency {dep} has no stored output"))
            })?;
            let parsed = StructuredRecord::from_value(*dep, output).map_err(|e| {
                violation(job_id, phase, format!("stored output of {dep} is unreadable: {e}"))
            })?;
            inputs
                .insert(parsed)
                .map_err(|e| violation(job_id, phase, e.to_string()))?;
        }
        Ok(inputs)
    }

    fn commit_success(
        &self,
        job: &mut JobRecord,
        success: PhaseSuccess,
        phases: &mut BTreeMap<PhaseId, PhaseRecord>,
    ) -> Result<(), EngineError> {
        let record = success.record;
        self.store
            .upsert_phase(&job.job_id, &record, Some(PhaseStatus::Running))?;

        job.total_cost_usd += record.cost_usd;
        job.total_tokens = job.total_tokens.saturating_add(record.usage.total_tokens());
        job.touch();
        self.store.update_job(job)?;

        log_phase_complete(
            job.job_id.as_str(),
            record.name.as_str(),
            record.duration_ms.unwrap_or(0),
            record.degraded,
        );
        if let Some(reasoning) = success.reasoning {
            self.remember(job, record.name, reasoning, success.quality, success.model);
        }
        phases.insert(record.name, record);
        Ok(())
    }

    fn commit_failure(
        &self,
        job: &mut JobRecord,
        running: &PhaseRecord,
        fatal: Fatal,
        started: Instant,
    ) -> Result<(PhaseRecord, PhaseFailure), EngineError> {
        let message = redact_secrets(&fatal.message);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log_phase_error(job.job_id.as_str(), running.name.as_str(), &message, duration_ms);

        let failed = PhaseRecord {
            status: PhaseStatus::Failed,
            error: Some(message.clone()),
            duration_ms: Some(duration_ms),
            ..running.clone()
        };
        self.store
            .upsert_phase(&job.job_id, &failed, Some(PhaseStatus::Running))?;
        job.status = JobStatus::Failed;
        job.touch();
        self.store.update_job(job)?;

        Ok((
            failed,
            PhaseFailure {
                phase: running.name,
                message,
                gateway: fatal.gateway,
            },
        ))
    }

    /// A checkpoint write failed while `running` was the stored status of
    /// the phase. Record the phase and the job as failed so the checkpoint
    /// never claims work is in progress; both writes are best-effort.
    fn abandon_phase(&self, job: &mut JobRecord, running: &PhaseRecord, cause: &EngineError) {
        let message = redact_secrets(&format!("checkpoint write failed: {cause}"));
        error!(job_id = %job.job_id, phase = %running.name, error = %message, "Abandoning phase");
        let failed = PhaseRecord {
            status: PhaseStatus::Failed,
            error: Some(message),
            ..running.clone()
        };
        if let Err(e) = self
            .store
            .upsert_phase(&job.job_id, &failed, Some(PhaseStatus::Running))
        {
            warn!(job_id = %job.job_id, phase = %running.name, error = %e, "Failed to mark phase as failed");
        }
        self.fail_job(job);
    }

    /// Mark the job failed. A write failure here is logged; the caller is
    /// already returning a more specific error.
    fn fail_job(&self, job: &mut JobRecord) {
        job.status = JobStatus::Failed;
        job.touch();
        if let Err(e) = self.store.update_job(job) {
            warn!(job_id = %job.job_id, error = %e, "Failed to mark job as failed");
        }
    }

    /// Reference traces for `phase`. Failures are logged and ignored.
    fn retrieve_traces(&self, phase: PhaseId) -> Vec<ReasoningTrace> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        if self.retrieve_limit == 0 {
            return Vec::new();
        }
        match memory.retrieve(phase, self.retrieve_limit) {
            Ok(traces) => {
                debug!(phase = %phase, count = traces.len(), "Retrieved reasoning traces");
                traces
            }
            Err(e) => {
                warn!(phase = %phase, error = %e, "Reasoning memory unavailable; continuing without traces");
                Vec::new()
            }
        }
    }

    /// Score a trace and keep it if it clears the threshold. Never fails.
    fn remember(
        &self,
        job: &JobRecord,
        phase: PhaseId,
        reasoning: String,
        quality: InterpretationQuality,
        model: String,
    ) {
        let Some(memory) = &self.memory else {
            return;
        };
        let score = self.scorer.score(&reasoning, quality);
        if score < QUALITY_THRESHOLD {
            debug!(phase = %phase, score, "Reasoning trace below threshold; not stored");
            return;
        }

        let content = TraceContent {
            reasoning,
            model,
            job_id: job.job_id.to_string(),
        };
        match memory.store(phase, content, score) {
            Ok(StoreOutcome::Stored { id }) => {
                info!(phase = %phase, score, trace_id = %id, "Stored reasoning trace");
            }
            Ok(outcome) => debug!(phase = %phase, ?outcome, "Reasoning trace not stored"),
            Err(e) => warn!(phase = %phase, error = %e, "Failed to store reasoning trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(phases: Vec<PhaseId>) -> JobRecord {
        JobRecord::new(JobId::parse("v").unwrap(), "t", "s", "baseline", phases)
    }

    fn completed(phase: PhaseId) -> PhaseRecord {
        PhaseRecord {
            status: PhaseStatus::Completed,
            output: Some(serde_json::json!({})),
            ..PhaseRecord::pending(phase)
        }
    }

    #[test]
    fn test_valid_partial_checkpoint() {
        let job = job(PhaseId::ALL.to_vec());
        let phases: BTreeMap<_, _> = [
            (PhaseId::DnaExtraction, completed(PhaseId::DnaExtraction)),
            (PhaseId::CharacterProfiles, PhaseRecord::pending(PhaseId::CharacterProfiles)),
        ]
        .into_iter()
        .collect();
        assert!(validate_checkpoint(&job, &phases).is_ok());
    }

    #[test]
    fn test_completed_phase_with_pending_dependency() {
        let job = job(PhaseId::ALL.to_vec());
        let phases: BTreeMap<_, _> = [
            (PhaseId::DnaExtraction, completed(PhaseId::DnaExtraction)),
            (PhaseId::CharacterProfiles, PhaseRecord::pending(PhaseId::CharacterProfiles)),
            (PhaseId::NarrativeStructure, completed(PhaseId::NarrativeStructure)),
        ]
        .into_iter()
        .collect();
        let err = validate_checkpoint(&job, &phases).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DependencyViolation {
                phase: PhaseId::NarrativeStructure,
                ..
            }
        ));
    }

    #[test]
    fn test_completed_without_output() {
        let job = job(PhaseId::ALL.to_vec());
        let mut record = completed(PhaseId::DnaExtraction);
        record.output = None;
        let phases: BTreeMap<_, _> = [(PhaseId::DnaExtraction, record)].into_iter().collect();
        assert!(validate_checkpoint(&job, &phases).is_err());
    }

    #[test]
    fn test_enabled_phase_with_disabled_dependency() {
        let job = job(vec![PhaseId::DnaExtraction, PhaseId::CoverArt]);
        assert!(validate_checkpoint(&job, &BTreeMap::new()).is_err());
    }
}
