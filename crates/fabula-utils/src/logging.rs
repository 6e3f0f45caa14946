//! Logging and observability infrastructure for fabula
//!
//! Structured logging via `tracing`: a subscriber initializer for the CLI and
//! span/event helpers the orchestrator uses around every phase.

use std::io::IsTerminal;
use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::redaction::redact_secrets;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "FABULA_LOG";

fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("fabula=debug,info")
            } else {
                EnvFilter::try_new("fabula=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the tracing subscriber.
///
/// Compact, target-less output by default. `verbose` switches on debug level
/// for fabula crates, event targets and span close timings.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = build_filter(verbose);

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(use_color())
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(use_color())
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one phase execution.
pub fn phase_span(job_id: &str, phase: &str) -> tracing::Span {
    span!(Level::INFO, "phase", job_id = %job_id, phase = %phase)
}

pub fn log_phase_start(job_id: &str, phase: &str, attempt: u32) {
    info!(job_id = %job_id, phase = %phase, attempt, "Starting phase");
}

pub fn log_phase_skipped(job_id: &str, phase: &str) {
    info!(job_id = %job_id, phase = %phase, "Phase already completed, reusing stored output");
}

pub fn log_phase_complete(job_id: &str, phase: &str, duration_ms: u64, degraded: bool) {
    if degraded {
        warn!(
            job_id = %job_id,
            phase = %phase,
            duration_ms,
            "Phase completed with degraded output"
        );
    } else {
        info!(job_id = %job_id, phase = %phase, duration_ms, "Phase completed");
    }
}

/// Log a phase failure. The error text is redacted before it is emitted.
pub fn log_phase_error(job_id: &str, phase: &str, error: &str, duration_ms: u64) {
    let sanitized = redact_secrets(error);
    error!(
        job_id = %job_id,
        phase = %phase,
        duration_ms,
        error = %sanitized,
        "Phase failed"
    );
}
