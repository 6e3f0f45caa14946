//! File-backed checkpoints under `<home>/jobs/<job_id>/`.
//!
//! ```text
//! jobs/<job_id>/
//!   .lock                       held by the running orchestrator
//!   job.json                    JobRecord
//!   phases/1-dna_extraction.json
//!   phases/2-character_profiles.json
//!   ...
//! ```
//!
//! Records are emitted as canonical JSON (JCS, RFC 8785) and written
//! atomically. Phase writes for a job are additionally serialized by an
//! in-process mutex so the compare-and-write is not interleaved.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use camino::Utf8Path;
use fabula_lock::{JobLock, LockError};
use fabula_utils::atomic_write::write_bytes_atomic;
use fabula_utils::paths::FabulaHome;
use fabula_utils::types::{JobId, PhaseId, PhaseStatus};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StoreError;
use crate::records::{JobRecord, PhaseRecord};
use crate::store::{CheckpointStore, JobGuard, check_transition};

#[derive(Debug)]
pub struct FileCheckpointStore {
    home: FabulaHome,
    job_mutexes: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl FileCheckpointStore {
    pub fn new(home: FabulaHome) -> Self {
        Self {
            home,
            job_mutexes: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn home(&self) -> &FabulaHome {
        &self.home
    }

    /// Ids of every job with a `job.json`, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the jobs directory cannot be listed.
    pub fn list_jobs(&self) -> Result<Vec<JobId>, StoreError> {
        let dir = self.home.jobs_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: dir,
                    reason: e.to_string(),
                });
            }
        };

        let mut ids: Vec<JobId> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().and_then(|n| JobId::parse(n).ok()))
            .filter(|id| self.home.job_file(id).exists())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn job_mutex(&self, job_id: &JobId) -> Arc<Mutex<()>> {
        self.job_mutexes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(job_id.clone())
            .or_default()
            .clone()
    }

    fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, StoreError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.to_owned(),
                    reason: e.to_string(),
                });
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupted {
                path: path.to_owned(),
                reason: e.to_string(),
            })
    }

    fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), StoreError> {
        let write = || -> anyhow::Result<()> {
            let json_value =
                serde_json::to_value(value).context("Failed to serialize checkpoint record")?;
            let bytes = serde_json_canonicalizer::to_vec(&json_value)
                .context("Failed to canonicalize checkpoint JSON")?;
            write_bytes_atomic(path, &bytes)?;
            Ok(())
        };
        write().map_err(|e| StoreError::Io {
            path: path.to_owned(),
            reason: format!("{e:#}"),
        })
    }

    fn read_phase(&self, job_id: &JobId, phase: PhaseId) -> Result<Option<PhaseRecord>, StoreError> {
        Self::read_json(&self.home.phase_file(job_id, phase))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        Self::read_json(&self.home.job_file(job_id))
    }

    fn create_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let path = self.home.job_file(&job.job_id);
        if path.exists() {
            return Err(StoreError::JobExists {
                job_id: job.job_id.to_string(),
            });
        }

        // Phase files first: a job.json always has its pending phases beside it.
        for phase in &job.phases_enabled {
            Self::write_json(
                &self.home.phase_file(&job.job_id, *phase),
                &PhaseRecord::pending(*phase),
            )?;
        }
        Self::write_json(&path, job)?;
        debug!(job_id = %job.job_id, phases = job.phases_enabled.len(), "Created job checkpoint");
        Ok(())
    }

    fn update_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        let path = self.home.job_file(&job.job_id);
        if !path.exists() {
            return Err(StoreError::JobNotFound {
                job_id: job.job_id.to_string(),
            });
        }
        Self::write_json(&path, job)
    }

    fn upsert_phase(
        &self,
        job_id: &JobId,
        record: &PhaseRecord,
        expected_prior: Option<PhaseStatus>,
    ) -> Result<(), StoreError> {
        let job = self.load_job(job_id)?.ok_or_else(|| StoreError::JobNotFound {
            job_id: job_id.to_string(),
        })?;
        if !job.runs(record.name) {
            return Err(StoreError::PhaseNotEnabled {
                job_id: job_id.to_string(),
                phase: record.name,
            });
        }

        let mutex = self.job_mutex(job_id);
        let _serialized = mutex.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.read_phase(job_id, record.name)?.map(|r| r.status);
        check_transition(job_id, record, current, expected_prior)?;

        Self::write_json(&self.home.phase_file(job_id, record.name), record)?;
        debug!(
            job_id = %job_id,
            phase = %record.name,
            from = ?current,
            to = %record.status,
            "Phase checkpoint written"
        );
        Ok(())
    }

    fn get_phases(&self, job_id: &JobId) -> Result<Vec<PhaseRecord>, StoreError> {
        let mut records = Vec::new();
        for phase in PhaseId::ALL {
            if let Some(record) = self.read_phase(job_id, phase)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn lock_job(&self, job_id: &JobId) -> Result<JobGuard, StoreError> {
        let lock_path = self.home.job_lock_file(job_id);
        let lock = JobLock::acquire(&lock_path, job_id.as_str()).map_err(|e| match e {
            LockError::Held { .. } => StoreError::JobLocked {
                job_id: job_id.to_string(),
                reason: e.to_string(),
            },
            other => StoreError::Io {
                path: lock_path.clone(),
                reason: other.to_string(),
            },
        })?;
        Ok(JobGuard::new(job_id.clone(), lock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileCheckpointStore) {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, FileCheckpointStore::new(FabulaHome::new(root)))
    }

    fn job(id: &str) -> JobRecord {
        JobRecord::new(
            JobId::parse(id).unwrap(),
            "Alpha",
            "It was a dark and stormy night.",
            "baseline",
            PhaseId::ALL.to_vec(),
        )
    }

    #[test]
    fn test_create_and_load_round_trip() {
        let (_temp, store) = store();
        let job = job("alpha");
        store.create_job(&job).unwrap();

        assert_eq!(store.load_job(&job.job_id).unwrap().unwrap(), job);
        let phases = store.get_phases(&job.job_id).unwrap();
        assert_eq!(phases.len(), 5);
        assert!(phases.iter().all(|p| p.status == PhaseStatus::Pending));
        assert_eq!(phases[2].name, PhaseId::NarrativeStructure);
    }

    #[test]
    fn test_create_twice_fails() {
        let (_temp, store) = store();
        store.create_job(&job("alpha")).unwrap();
        assert!(matches!(
            store.create_job(&job("alpha")),
            Err(StoreError::JobExists { .. })
        ));
    }

    #[test]
    fn test_files_are_canonical_json() {
        let (_temp, store) = store();
        let job = job("alpha");
        store.create_job(&job).unwrap();
        let raw = fs::read_to_string(store.home().job_file(&job.job_id)).unwrap();
        assert!(!raw.contains('\n'));
        // JCS sorts keys.
        assert!(raw.find("\"created_at\"").unwrap() < raw.find("\"job_id\"").unwrap());
    }

    #[test]
    fn test_conditional_write_detects_conflict() {
        let (_temp, store) = store();
        let job = job("alpha");
        store.create_job(&job).unwrap();

        let running = PhaseRecord::pending(PhaseId::DnaExtraction).begin_attempt();
        store
            .upsert_phase(&job.job_id, &running, Some(PhaseStatus::Pending))
            .unwrap();

        let err = store
            .upsert_phase(&job.job_id, &running, Some(PhaseStatus::Pending))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                found: Some(PhaseStatus::Running),
                ..
            }
        ));
    }

    #[test]
    fn test_completed_phase_is_immutable() {
        let (_temp, store) = store();
        let job = job("alpha");
        store.create_job(&job).unwrap();

        let mut done = PhaseRecord::pending(PhaseId::DnaExtraction).begin_attempt();
        store
            .upsert_phase(&job.job_id, &done, Some(PhaseStatus::Pending))
            .unwrap();
        done.status = PhaseStatus::Completed;
        done.output = Some(serde_json::json!({"genre": "Drama"}));
        store
            .upsert_phase(&job.job_id, &done, Some(PhaseStatus::Running))
            .unwrap();

        let err = store
            .upsert_phase(&job.job_id, &done, Some(PhaseStatus::Completed))
            .unwrap_err();
        assert!(matches!(err, StoreError::PhaseImmutable { .. }));
    }

    #[test]
    fn test_disabled_phase_rejected() {
        let (_temp, store) = store();
        let mut job = job("alpha");
        job.phases_enabled.retain(|p| *p != PhaseId::CoverArt);
        store.create_job(&job).unwrap();

        let record = PhaseRecord::pending(PhaseId::CoverArt);
        assert!(matches!(
            store.upsert_phase(&job.job_id, &record, None),
            Err(StoreError::PhaseNotEnabled { .. })
        ));
        assert_eq!(store.get_phases(&job.job_id).unwrap().len(), 4);
    }

    #[test]
    fn test_second_lock_is_rejected_until_release() {
        let (_temp, store) = store();
        let job = job("alpha");
        store.create_job(&job).unwrap();

        let guard = store.lock_job(&job.job_id).unwrap();
        assert!(matches!(
            store.lock_job(&job.job_id),
            Err(StoreError::JobLocked { .. })
        ));
        drop(guard);
        store.lock_job(&job.job_id).unwrap();
    }

    #[test]
    fn test_list_jobs() {
        let (_temp, store) = store();
        store.create_job(&job("beta")).unwrap();
        store.create_job(&job("alpha")).unwrap();
        let ids: Vec<String> = store.list_jobs().unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }
}
