use fabula_utils::types::{JobId, PhaseStatus};

use crate::error::StoreError;
use crate::records::{JobRecord, PhaseRecord};

/// Exclusive right to advance one job. Released on drop.
pub struct JobGuard {
    job_id: JobId,
    _held: Box<dyn Send + Sync>,
}

impl JobGuard {
    pub fn new(job_id: JobId, held: impl Send + Sync + 'static) -> Self {
        Self {
            job_id,
            _held: Box::new(held),
        }
    }

    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl std::fmt::Debug for JobGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobGuard")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

/// Durable projection of a job and its phases.
///
/// Reads reflect the latest successful write. Phase writes are
/// conditional on the status the writer last observed, and a completed
/// phase can never be written again.
pub trait CheckpointStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StoreError` when the job file exists but cannot be read.
    fn load_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Persist a new job and a `pending` record for each enabled phase.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::JobExists` if the job is already present.
    fn create_job(&self, job: &JobRecord) -> Result<(), StoreError>;

    /// Overwrite job-level fields (status, totals, timestamps).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::JobNotFound` if the job was never created.
    fn update_job(&self, job: &JobRecord) -> Result<(), StoreError>;

    /// Write `record` if the stored status still equals `expected_prior`
    /// (`None`: no record stored yet).
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` when the stored status differs
    /// - `StoreError::PhaseImmutable` when the stored phase is completed
    /// - `StoreError::PhaseNotEnabled` when the phase is not in the job's graph
    fn upsert_phase(
        &self,
        job_id: &JobId,
        record: &PhaseRecord,
        expected_prior: Option<PhaseStatus>,
    ) -> Result<(), StoreError>;

    /// Stored phase records, ordered by ordinal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when a phase file cannot be read.
    fn get_phases(&self, job_id: &JobId) -> Result<Vec<PhaseRecord>, StoreError>;

    /// Acquire the per-job lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::JobLocked` if another holder owns the job.
    fn lock_job(&self, job_id: &JobId) -> Result<JobGuard, StoreError>;
}

/// Shared precondition check for conditional phase writes.
pub(crate) fn check_transition(
    job_id: &JobId,
    record: &PhaseRecord,
    current: Option<PhaseStatus>,
    expected_prior: Option<PhaseStatus>,
) -> Result<(), StoreError> {
    if current == Some(PhaseStatus::Completed) {
        return Err(StoreError::PhaseImmutable {
            job_id: job_id.to_string(),
            phase: record.name,
        });
    }
    if current != expected_prior {
        return Err(StoreError::Conflict {
            job_id: job_id.to_string(),
            phase: record.name,
            expected: expected_prior,
            found: current,
        });
    }
    Ok(())
}
