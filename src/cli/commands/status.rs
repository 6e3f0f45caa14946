//! `fabula status`: read-only view of one job's checkpoint, or a one-line
//! summary of every job.

use fabula_checkpoint::{CheckpointStore, FileCheckpointStore};
use fabula_config::Config;
use fabula_engine::{EngineError, JobResult};
use fabula_utils::types::JobId;

use super::render::{emit_json, print_job_result};
use crate::error::FabulaError;

/// Does not take the job lock, so it works while a run is in progress.
pub fn execute_status_command(
    job_id: Option<&str>,
    json: bool,
    config: &Config,
) -> Result<(), FabulaError> {
    let store = FileCheckpointStore::new(config.home());
    let Some(job_id) = job_id else {
        let results = store
            .list_jobs()
            .map_err(EngineError::from)?
            .iter()
            .map(|id| load_status(&store, id))
            .collect::<Result<Vec<_>, _>>()?;
        if json {
            let rows: Vec<_> = results.iter().map(job_row_json).collect();
            println!("{}", emit_json(&rows)?);
        } else if results.is_empty() {
            println!("No jobs under {}", config.home().root());
        } else {
            for result in &results {
                println!("{}", format_job_row(result));
            }
        }
        return Ok(());
    };

    let job_id = JobId::parse(job_id)?;
    let result = load_status(&store, &job_id)?;
    if json {
        println!("{}", emit_json(&result)?);
    } else {
        print_job_result(&result);
    }
    Ok(())
}

fn job_row_json(result: &JobResult) -> serde_json::Value {
    serde_json::json!({
        "job_id": result.job_id.as_str(),
        "title": result.title,
        "status": result.status.as_str(),
        "headline": result.headline(),
    })
}

fn format_job_row(result: &JobResult) -> String {
    format!(
        "{:<24} {:<10} {} ({})",
        result.job_id.as_str(),
        result.status.as_str(),
        result.title,
        result.headline()
    )
}

fn load_status(store: &dyn CheckpointStore, job_id: &JobId) -> Result<JobResult, EngineError> {
    let job = store
        .load_job(job_id)?
        .ok_or_else(|| EngineError::JobNotFound {
            job_id: job_id.to_string(),
        })?;
    let phases = store.get_phases(job_id)?;
    Ok(JobResult::snapshot(&job, &phases))
}
