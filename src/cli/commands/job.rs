//! `fabula run` and `fabula resume`.

use std::future::Future;
use std::io::Read;
use std::sync::Arc;

use fabula_config::Config;
use fabula_engine::{
    CancellationFlag, EngineError, JobResult, JobSpec, OrchestratorHandle, sink_from_config,
};
use fabula_utils::types::JobId;
use tracing::{debug, warn};

use super::render::{emit_json, print_job_result};
use crate::error::FabulaError;

pub async fn execute_run_command(
    job_id: &str,
    source: &str,
    title: Option<String>,
    profile: Option<String>,
    json: bool,
    config: &Config,
) -> Result<(), FabulaError> {
    let job_id = JobId::parse(job_id)?;
    let source_text = read_source(source)?;

    let mut spec = JobSpec::new(job_id, source_text);
    spec.title = title;
    spec.profile = profile;

    let result = with_handle(config, |handle| async move {
        handle.start_or_resume(spec).await
    })
    .await?;
    finish(&result, json)
}

pub async fn execute_resume_command(
    job_id: &str,
    json: bool,
    config: &Config,
) -> Result<(), FabulaError> {
    let job_id = JobId::parse(job_id)?;
    let result = with_handle(config, |handle| async move { handle.resume(&job_id).await }).await?;
    finish(&result, json)
}

/// Build a handle, run `f` with Ctrl-C wired to cancellation, then drain the
/// telemetry writer.
async fn with_handle<F, Fut>(config: &Config, f: F) -> Result<JobResult, FabulaError>
where
    F: FnOnce(Arc<OrchestratorHandle>) -> Fut,
    Fut: Future<Output = Result<JobResult, EngineError>>,
{
    let home = config.home();
    let (sink, writer) = sink_from_config(&config.telemetry, &home);
    let cancel = CancellationFlag::new();
    let handle = Arc::new(OrchestratorHandle::from_config(
        config,
        Arc::clone(&sink),
        cancel.clone(),
    )?);

    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping after the current phase");
                cancel.cancel();
            }
        }
    });

    let result = f(Arc::clone(&handle)).await;
    watcher.abort();

    drop(handle);
    drop(sink);
    if let Some(writer) = writer {
        let lines = writer.finish().await;
        debug!(lines, "Telemetry writer drained");
    }

    Ok(result?)
}

fn finish(result: &JobResult, json: bool) -> Result<(), FabulaError> {
    if json {
        println!("{}", emit_json(result)?);
    } else {
        print_job_result(result);
        if result.cancelled {
            println!("\nResume with: fabula resume {}", result.job_id);
        }
    }

    match FabulaError::from_job_result(result) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn read_source(source: &str) -> Result<String, FabulaError> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|source| FabulaError::SourceRead {
                path: "stdin".to_string(),
                source,
            })?;
        return Ok(text);
    }
    std::fs::read_to_string(source).map_err(|e| FabulaError::SourceRead {
        path: source.to_string(),
        source: e,
    })
}
