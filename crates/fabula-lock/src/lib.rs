//! Advisory per-job lock with crash recovery.
//!
//! One orchestrator advances a job at a time. The lock is a JSON file created
//! with `create_new` (O_EXCL) and held under an `fd-lock` write guard for the
//! lifetime of [`JobLock`]. A lock left behind by a dead process is reclaimed
//! on the next acquisition; a lock owned by a live process is reported as
//! [`LockError::Held`]. The lock coordinates fabula processes; it is not a
//! security boundary.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::process;
use std::time::Duration;

const MAX_ACQUIRE_ATTEMPTS: u32 = 3;
const MAX_READ_RETRIES: u32 = 3;
const READ_RETRY_DELAY_MS: u64 = 10;

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process that holds the lock.
    pub pid: u32,
    /// RFC3339 UTC acquisition time.
    pub created_at: DateTime<Utc>,
    /// Job being advanced.
    pub job_id: String,
    /// fabula version of the holder.
    pub fabula_version: String,
}

impl LockInfo {
    fn for_current_process(job_id: &str) -> Self {
        Self {
            pid: process::id(),
            created_at: Utc::now(),
            job_id: job_id.to_string(),
            fabula_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Human-readable age such as `42s`, `5m`, `3h`, `2d`.
    fn age_display(&self) -> String {
        format_age(Utc::now().signed_duration_since(self.created_at).num_seconds())
    }
}

/// Lock errors
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Job '{job_id}' is being advanced by another process (PID {pid}, acquired {age} ago)")]
    Held { job_id: String, pid: u32, age: String },

    #[error("Lock file for job '{job_id}' is corrupted: {reason}")]
    Corrupted { job_id: String, reason: String },

    #[error("Failed to acquire lock for job '{job_id}': {reason}")]
    AcquisitionFailed { job_id: String, reason: String },

    #[error("IO error during lock operation: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive lock on one job directory. Released on drop.
pub struct JobLock {
    lock_path: Utf8PathBuf,
    fd_lock: Option<Box<RwLock<fs::File>>>,
    info: LockInfo,
}

impl JobLock {
    /// Acquire the lock at `lock_path` for `job_id`.
    ///
    /// Parent directories are created. An existing lock whose process is no
    /// longer running is reclaimed.
    pub fn acquire(lock_path: &Utf8Path, job_id: &str) -> Result<Self, LockError> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::AcquisitionFailed {
                job_id: job_id.to_string(),
                reason: format!("failed to create job directory {parent}: {e}"),
            })?;
        }

        for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(lock_path)
            {
                Ok(file) => {
                    return Self::finalize(
                        lock_path.to_path_buf(),
                        file,
                        LockInfo::for_current_process(job_id),
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::check_existing(lock_path, job_id)?;
                    Self::remove_stale(lock_path, job_id)?;
                    if attempt + 1 < MAX_ACQUIRE_ATTEMPTS {
                        // Deterministic jitter so racing processes do not retry in lockstep.
                        let jitter = u64::from(process::id() % 7);
                        std::thread::sleep(Duration::from_millis(
                            (10u64 << attempt).saturating_add(jitter),
                        ));
                    }
                }
                Err(e) => {
                    return Err(LockError::AcquisitionFailed {
                        job_id: job_id.to_string(),
                        reason: format!("failed to create lock file {lock_path}: {e}"),
                    });
                }
            }
        }

        Err(LockError::AcquisitionFailed {
            job_id: job_id.to_string(),
            reason: format!(
                "another process acquired the lock after stale removal ({MAX_ACQUIRE_ATTEMPTS} attempts)"
            ),
        })
    }

    fn finalize(
        lock_path: Utf8PathBuf,
        file: fs::File,
        info: LockInfo,
    ) -> Result<Self, LockError> {
        let json = serde_json::to_string_pretty(&info).map_err(|e| {
            LockError::AcquisitionFailed {
                job_id: info.job_id.clone(),
                reason: format!("failed to serialize lock info: {e}"),
            }
        })?;

        let mut rw_lock = Box::new(RwLock::new(file));
        {
            let guard = rw_lock.try_write().map_err(|_| LockError::Held {
                job_id: info.job_id.clone(),
                pid: 0,
                age: "unknown".to_string(),
            })?;
            let mut file_ref = &*guard;
            file_ref.write_all(json.as_bytes())?;
            file_ref.flush()?;
            file_ref.sync_all()?;
        }

        tracing::debug!(job_id = %info.job_id, path = %lock_path, "Acquired job lock");
        Ok(Self {
            lock_path,
            fd_lock: Some(rw_lock),
            info,
        })
    }

    /// Decide whether an existing lock may be reclaimed. `Ok(())` means yes.
    ///
    /// Empty or truncated files are re-read a few times: the holder may have
    /// created the file and not yet written it.
    fn check_existing(lock_path: &Utf8Path, job_id: &str) -> Result<(), LockError> {
        for attempt in 0..MAX_READ_RETRIES {
            let content = match fs::read_to_string(lock_path) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(LockError::Io(e)),
            };

            match serde_json::from_str::<LockInfo>(&content) {
                Ok(existing) => {
                    if is_process_running(existing.pid) {
                        return Err(LockError::Held {
                            job_id: job_id.to_string(),
                            pid: existing.pid,
                            age: existing.age_display(),
                        });
                    }
                    tracing::warn!(
                        job_id = %job_id,
                        pid = existing.pid,
                        "Reclaiming job lock left by a previous run"
                    );
                    return Ok(());
                }
                Err(e) => {
                    let incomplete = content.trim().is_empty() || e.is_eof();
                    if incomplete && attempt + 1 < MAX_READ_RETRIES {
                        std::thread::sleep(Duration::from_millis(READ_RETRY_DELAY_MS));
                        continue;
                    }
                    return Err(LockError::Corrupted {
                        job_id: job_id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Rename-then-delete so a concurrent reader never sees a half-removed file.
    fn remove_stale(lock_path: &Utf8Path, job_id: &str) -> Result<(), LockError> {
        let stale = lock_path.with_extension(format!(
            "stale.{}.{}",
            Utc::now().timestamp_millis(),
            process::id()
        ));
        match fs::rename(lock_path, &stale) {
            Ok(()) => {
                let _ = fs::remove_file(&stale);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::AcquisitionFailed {
                job_id: job_id.to_string(),
                reason: format!("failed to remove stale lock: {e}"),
            }),
        }
    }
}

impl std::fmt::Debug for JobLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLock")
            .field("lock_path", &self.lock_path)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        self.fd_lock.take();
        let _ = fs::remove_file(&self.lock_path);
    }
}

/// Whether `pid` names a live process.
#[must_use]
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs only the existence and permission check.
        let rc = unsafe { libc::kill(raw, 0) };
        if rc == 0 {
            true
        } else {
            // EPERM: the process exists but belongs to another user.
            matches!(io::Error::last_os_error().raw_os_error(), Some(code) if code == libc::EPERM)
        }
    }

    #[cfg(windows)]
    {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::minwinbase::STILL_ACTIVE;
        use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
        use winapi::um::winnt::PROCESS_QUERY_LIMITED_INFORMATION;

        // SAFETY: the handle is checked for null and closed on every path.
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return false;
            }
            let mut exit_code: u32 = 0;
            let ok = GetExitCodeProcess(handle, &mut exit_code);
            CloseHandle(handle);
            ok != 0 && exit_code == STILL_ACTIVE
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        true
    }
}

fn format_age(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}
