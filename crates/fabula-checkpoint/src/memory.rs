use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use fabula_utils::types::{JobId, PhaseId, PhaseStatus};

use crate::error::StoreError;
use crate::records::{JobRecord, PhaseRecord};
use crate::store::{CheckpointStore, JobGuard, check_transition};

#[derive(Debug, Clone)]
struct StoredJob {
    job: JobRecord,
    phases: BTreeMap<PhaseId, PhaseRecord>,
}

/// Process-local checkpoint store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    jobs: RwLock<HashMap<JobId, StoredJob>>,
    locked: Arc<Mutex<HashSet<JobId>>>,
}

struct MemoryLock {
    job_id: JobId,
    locked: Arc<Mutex<HashSet<JobId>>>,
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        self.locked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.job_id);
    }
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a phase without any precondition. Test setup only.
    pub fn force_phase(&self, job_id: &JobId, record: PhaseRecord) {
        if let Some(stored) = self
            .jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(job_id)
        {
            stored.phases.insert(record.name, record);
        }
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .map(|s| s.job.clone()))
    }

    fn create_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&job.job_id) {
            return Err(StoreError::JobExists {
                job_id: job.job_id.to_string(),
            });
        }
        let phases = job
            .phases_enabled
            .iter()
            .map(|p| (*p, PhaseRecord::pending(*p)))
            .collect();
        jobs.insert(
            job.job_id.clone(),
            StoredJob {
                job: job.clone(),
                phases,
            },
        );
        Ok(())
    }

    fn update_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let stored = jobs
            .get_mut(&job.job_id)
            .ok_or_else(|| StoreError::JobNotFound {
                job_id: job.job_id.to_string(),
            })?;
        stored.job = job.clone();
        Ok(())
    }

    fn upsert_phase(
        &self,
        job_id: &JobId,
        record: &PhaseRecord,
        expected_prior: Option<PhaseStatus>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let stored = jobs.get_mut(job_id).ok_or_else(|| StoreError::JobNotFound {
            job_id: job_id.to_string(),
        })?;
        if !stored.job.runs(record.name) {
            return Err(StoreError::PhaseNotEnabled {
                job_id: job_id.to_string(),
                phase: record.name,
            });
        }
        let current = stored.phases.get(&record.name).map(|r| r.status);
        check_transition(job_id, record, current, expected_prior)?;
        stored.phases.insert(record.name, record.clone());
        Ok(())
    }

    fn get_phases(&self, job_id: &JobId) -> Result<Vec<PhaseRecord>, StoreError> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .map(|s| s.phases.values().cloned().collect())
            .unwrap_or_default())
    }

    fn lock_job(&self, job_id: &JobId) -> Result<JobGuard, StoreError> {
        let mut locked = self.locked.lock().unwrap_or_else(|e| e.into_inner());
        if !locked.insert(job_id.clone()) {
            return Err(StoreError::JobLocked {
                job_id: job_id.to_string(),
                reason: "already locked in this process".to_string(),
            });
        }
        Ok(JobGuard::new(
            job_id.clone(),
            MemoryLock {
                job_id: job_id.clone(),
                locked: Arc::clone(&self.locked),
            },
        ))
    }
}
