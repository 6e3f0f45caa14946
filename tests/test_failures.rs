//! Fatal phase errors, dependency violations, locking and cancellation.

mod test_support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fabula::FabulaError;
use fabula_checkpoint::{
    CheckpointStore, JobGuard, JobRecord, MemoryCheckpointStore, PhaseRecord, StoreError,
};
use fabula_engine::{EngineError, JobSpec};
use fabula_llm::{GatewayError, ScriptedBackend};
use fabula_memory::{MemoryError, ReasoningMemory, ReasoningTrace, StoreOutcome, TraceContent};
use fabula_utils::exit_codes::ExitCode;
use fabula_utils::types::{JobId, JobStatus, PhaseId, PhaseStatus};

use test_support::{
    ALPHA_SOURCE, DNA_JSON, Harness, STRUCTURE_JSON, TEXT_PHASES, clean_output,
    completed_record, job_id, strong_reasoning,
};

/// Delegates to an in-memory store but refuses to record one phase as
/// completed, like a disk filling up mid-run.
struct FullDiskStore {
    inner: Arc<MemoryCheckpointStore>,
    refuse: PhaseId,
}

impl CheckpointStore for FullDiskStore {
    fn load_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        self.inner.load_job(job_id)
    }

    fn create_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        self.inner.create_job(job)
    }

    fn update_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        self.inner.update_job(job)
    }

    fn upsert_phase(
        &self,
        job_id: &JobId,
        record: &PhaseRecord,
        expected_prior: Option<PhaseStatus>,
    ) -> Result<(), StoreError> {
        if record.name == self.refuse && record.status == PhaseStatus::Completed {
            return Err(StoreError::Io {
                path: "jobs/alpha/phases/character_profiles.json".into(),
                reason: "No space left on device".to_string(),
            });
        }
        self.inner.upsert_phase(job_id, record, expected_prior)
    }

    fn get_phases(&self, job_id: &JobId) -> Result<Vec<PhaseRecord>, StoreError> {
        self.inner.get_phases(job_id)
    }

    fn lock_job(&self, job_id: &JobId) -> Result<JobGuard, StoreError> {
        self.inner.lock_job(job_id)
    }
}

/// Reasoning memory whose backing directory is unusable.
#[derive(Default)]
struct BrokenMemory {
    store_attempts: AtomicUsize,
}

impl BrokenMemory {
    fn unwritable() -> MemoryError {
        MemoryError::Write {
            path: "memory/traces".into(),
            reason: "permission denied".to_string(),
        }
    }
}

impl ReasoningMemory for BrokenMemory {
    fn list(&self, _phase: PhaseId) -> Result<Vec<ReasoningTrace>, MemoryError> {
        Err(Self::unwritable())
    }

    fn store(
        &self,
        _phase: PhaseId,
        _content: TraceContent,
        _quality: u8,
    ) -> Result<StoreOutcome, MemoryError> {
        self.store_attempts.fetch_add(1, Ordering::SeqCst);
        Err(Self::unwritable())
    }

    fn record_usage(&self, _phase: PhaseId, _id: &str) -> Result<(), MemoryError> {
        Err(Self::unwritable())
    }
}

#[tokio::test]
async fn test_auth_failure_halts_job_at_phase() {
    let harness = Harness::new();
    harness.text.push_ok(PhaseId::DnaExtraction, clean_output(PhaseId::DnaExtraction));
    harness.text.push_err(
        PhaseId::CharacterProfiles,
        GatewayError::ProviderAuth("invalid x-api-key".to_string()),
    );

    let result = harness.handle.start_or_resume(harness.alpha_spec()).await.unwrap();

    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.headline(), "failed at phase 2 (character_profiles)");
    let failure = result.failure.as_ref().unwrap();
    assert!(matches!(failure.gateway, Some(GatewayError::ProviderAuth(_))));

    let stored = harness.phase("alpha", PhaseId::CharacterProfiles);
    assert_eq!(stored.status, PhaseStatus::Failed);
    assert!(stored.error.unwrap().contains("invalid x-api-key"));
    // Dependents never ran.
    assert_eq!(harness.text.calls_for(PhaseId::NarrativeStructure), 0);
    assert_eq!(harness.job("alpha").status, JobStatus::Failed);

    let err = FabulaError::from_job_result(&result).unwrap();
    assert_eq!(err.to_exit_code(), ExitCode::PROVIDER_FAILURE);
}

#[tokio::test]
async fn test_transient_errors_are_retried_before_failing() {
    let harness = Harness::builder().max_attempts(2).build();
    harness.text.push_err(
        PhaseId::DnaExtraction,
        GatewayError::Transport("connection reset".to_string()),
    );
    harness.script_clean_run();

    let result = harness.handle.start_or_resume(harness.alpha_spec()).await.unwrap();

    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(harness.text.calls_for(PhaseId::DnaExtraction), 2);
    // One phase attempt even though the gateway retried internally.
    assert_eq!(harness.phase("alpha", PhaseId::DnaExtraction).attempts, 1);
}

#[tokio::test]
async fn test_slow_model_times_out() {
    let harness = Harness::builder()
        .text_backend(ScriptedBackend::new().with_delay(Duration::from_millis(500)))
        .call_timeout(Duration::from_millis(20))
        .build();
    harness.script_clean_run();

    let result = harness.handle.start_or_resume(harness.alpha_spec()).await.unwrap();

    assert_eq!(result.failed_phase(), Some(PhaseId::DnaExtraction));
    let err = FabulaError::from_job_result(&result).unwrap();
    assert_eq!(err.to_exit_code(), ExitCode::PHASE_TIMEOUT);
}

#[tokio::test]
async fn test_inconsistent_checkpoint_is_a_dependency_violation() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let job = JobRecord::new(
        job_id("alpha"),
        "Alpha",
        ALPHA_SOURCE,
        "baseline",
        TEXT_PHASES.to_vec(),
    );
    store.create_job(&job).unwrap();
    store.force_phase(&job.job_id, completed_record(PhaseId::DnaExtraction, DNA_JSON));
    // Structure completed while its character dependency is still pending.
    store.force_phase(
        &job.job_id,
        completed_record(PhaseId::NarrativeStructure, STRUCTURE_JSON),
    );
    let harness = Harness::builder().store(store).build();
    harness.script_clean_run();

    let err = harness.handle.resume(&job_id("alpha")).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::DependencyViolation {
            phase: PhaseId::NarrativeStructure,
            ..
        }
    ));
    assert_eq!(harness.text.call_count(), 0);
    assert_eq!(harness.job("alpha").status, JobStatus::Failed);
    assert_eq!(
        FabulaError::from(err).to_exit_code(),
        ExitCode::DEPENDENCY_VIOLATION
    );
}

#[tokio::test]
async fn test_locked_job_is_rejected() {
    let harness = Harness::new();
    harness.script_clean_run();
    let _held = harness.store.lock_job(&job_id("alpha")).unwrap();

    let err = harness
        .handle
        .start_or_resume(harness.alpha_spec())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::JobLocked { .. }));
    assert_eq!(harness.text.call_count(), 0);
    assert_eq!(FabulaError::from(err).to_exit_code(), ExitCode::LOCK_HELD);
}

#[tokio::test]
async fn test_cancellation_stops_between_phases() {
    let harness = Harness::new();
    harness.script_clean_run();
    harness.cancel.cancel();

    let result = harness.handle.start_or_resume(harness.alpha_spec()).await.unwrap();

    assert!(result.cancelled);
    assert_eq!(result.status, JobStatus::Pending);
    assert_eq!(result.headline(), "cancelled (resumable)");
    assert_eq!(harness.text.call_count(), 0);

    harness.cancel.reset();
    let resumed = harness.handle.resume(&job_id("alpha")).await.unwrap();
    assert_eq!(resumed.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_unknown_profile_rejected_for_new_job() {
    let harness = Harness::new();
    let spec = JobSpec::new(job_id("alpha"), ALPHA_SOURCE).with_profile("nonexistent");

    let err = harness.handle.start_or_resume(spec).await.unwrap_err();

    assert!(matches!(err, EngineError::UnknownProfile { .. }));
    assert!(harness.store.load_job(&job_id("alpha")).unwrap().is_none());
}

#[tokio::test]
async fn test_resume_of_unknown_job() {
    let harness = Harness::new();
    let err = harness.handle.resume(&job_id("ghost")).await.unwrap_err();
    assert!(matches!(err, EngineError::JobNotFound { .. }));
    assert_eq!(FabulaError::from(err).to_exit_code(), ExitCode::CLI_ARGS);
}

#[tokio::test]
async fn test_checkpoint_write_failure_leaves_nothing_running() {
    let inner = Arc::new(MemoryCheckpointStore::new());
    let harness = Harness::builder()
        .store(Arc::new(FullDiskStore {
            inner: inner.clone(),
            refuse: PhaseId::CharacterProfiles,
        }))
        .build();
    harness.script_clean_run();

    let err = harness
        .handle
        .start_or_resume(harness.alpha_spec())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Store(StoreError::Io { .. })));
    assert_eq!(FabulaError::from(err).to_exit_code(), ExitCode::INTERNAL);

    let job = harness.job("alpha");
    assert_eq!(job.status, JobStatus::Failed);
    let phase = harness.phase("alpha", PhaseId::CharacterProfiles);
    assert_eq!(phase.status, PhaseStatus::Failed);
    assert!(phase.error.unwrap().contains("checkpoint write failed"));
    assert_eq!(harness.text.calls_for(PhaseId::NarrativeStructure), 0);

    // Once the disk recovers, the failed phase is picked up again.
    let retry = Harness::builder().store(inner).build();
    retry.script_clean_run();
    let result = retry.handle.resume(&job_id("alpha")).await.unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(retry.text.calls_for(PhaseId::DnaExtraction), 0);
}

#[tokio::test]
async fn test_broken_reasoning_memory_does_not_fail_the_job() {
    let memory = Arc::new(BrokenMemory::default());
    let harness = Harness::builder().memory(memory.clone()).build();
    for phase in TEXT_PHASES {
        harness
            .text
            .push_ok_with_reasoning(phase, clean_output(phase), strong_reasoning(phase.as_str()));
    }

    let result = harness.handle.start_or_resume(harness.alpha_spec()).await.unwrap();

    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.failed_phase(), None);
    assert!(memory.store_attempts.load(Ordering::SeqCst) > 0);
    for call in harness.text.invocations() {
        assert!(
            !call
                .messages
                .iter()
                .any(|m| m.content.contains("# Reference reasoning"))
        );
    }
}
