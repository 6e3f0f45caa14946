//! On-disk layout of a fabula home directory.
//!
//! ```text
//! <home>/
//!   jobs/<job_id>/job.json
//!   jobs/<job_id>/phases/<ordinal>-<phase>.json
//!   jobs/<job_id>/.lock
//!   memory/<phase>/<trace_id>.json
//!   telemetry/events.jsonl
//! ```
//!
//! Stores receive a [`FabulaHome`] explicitly; nothing here reads global state
//! except [`FabulaHome::resolve_from_env`].

use camino::{Utf8Path, Utf8PathBuf};

use crate::types::{JobId, PhaseId};

/// Environment variable that overrides the home directory.
pub const HOME_ENV_VAR: &str = "FABULA_HOME";

/// Home used when nothing else is configured.
pub const DEFAULT_HOME: &str = ".fabula";

/// Root of all persistent fabula state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabulaHome {
    root: Utf8PathBuf,
}

impl FabulaHome {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the home directory.
    ///
    /// Precedence: CLI flag, then `FABULA_HOME` (passed in as `env`), then the
    /// config file value, then `.fabula`.
    #[must_use]
    pub fn resolve(
        cli: Option<&Utf8Path>,
        env: Option<&str>,
        config: Option<&Utf8Path>,
    ) -> Self {
        if let Some(path) = cli {
            return Self::new(path);
        }
        if let Some(path) = env.filter(|v| !v.trim().is_empty()) {
            return Self::new(path);
        }
        if let Some(path) = config {
            return Self::new(path);
        }
        Self::new(DEFAULT_HOME)
    }

    /// [`resolve`](Self::resolve) with `env` read from `FABULA_HOME`.
    #[must_use]
    pub fn resolve_from_env(cli: Option<&Utf8Path>, config: Option<&Utf8Path>) -> Self {
        let env = std::env::var(HOME_ENV_VAR).ok();
        Self::resolve(cli, env.as_deref(), config)
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn jobs_dir(&self) -> Utf8PathBuf {
        self.root.join("jobs")
    }

    #[must_use]
    pub fn job_dir(&self, job_id: &JobId) -> Utf8PathBuf {
        self.jobs_dir().join(job_id.as_str())
    }

    #[must_use]
    pub fn job_file(&self, job_id: &JobId) -> Utf8PathBuf {
        self.job_dir(job_id).join("job.json")
    }

    #[must_use]
    pub fn job_lock_file(&self, job_id: &JobId) -> Utf8PathBuf {
        self.job_dir(job_id).join(".lock")
    }

    #[must_use]
    pub fn phases_dir(&self, job_id: &JobId) -> Utf8PathBuf {
        self.job_dir(job_id).join("phases")
    }

    /// `phases/<ordinal>-<name>.json`, so a directory listing sorts in pipeline order.
    #[must_use]
    pub fn phase_file(&self, job_id: &JobId, phase: PhaseId) -> Utf8PathBuf {
        self.phases_dir(job_id)
            .join(format!("{}-{}.json", phase.ordinal(), phase.as_str()))
    }

    #[must_use]
    pub fn memory_dir(&self) -> Utf8PathBuf {
        self.root.join("memory")
    }

    #[must_use]
    pub fn telemetry_file(&self) -> Utf8PathBuf {
        self.root.join("telemetry").join("events.jsonl")
    }
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}
