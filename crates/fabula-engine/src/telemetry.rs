//! Best-effort telemetry.
//!
//! The orchestrator emits one event per query, observed reasoning trace,
//! response and notable system condition. Emission is synchronous and never
//! blocks or fails the pipeline: a full or closed sink drops the event.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use fabula_config::{TelemetryConfig, TelemetrySinkKind};
use fabula_utils::paths::FabulaHome;
use fabula_utils::types::{JobId, PhaseId};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    QuerySent,
    ReasoningObserved,
    ResponseReceived,
    SystemNote,
}

impl TelemetryKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QuerySent => "query_sent",
            Self::ReasoningObserved => "reasoning_observed",
            Self::ResponseReceived => "response_received",
            Self::SystemNote => "system_note",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub kind: TelemetryKind,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PhaseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    fn new(kind: TelemetryKind, job_id: &JobId, phase: Option<PhaseId>) -> Self {
        Self {
            kind,
            job_id: job_id.to_string(),
            phase,
            model: None,
            tokens: 0,
            cost_usd: 0.0,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// A request is about to be sent. `tokens` is unknown at this point.
    #[must_use]
    pub fn query_sent(job_id: &JobId, phase: PhaseId, model: &str, prompt_chars: usize) -> Self {
        Self {
            model: Some(model.to_string()),
            detail: Some(format!("{prompt_chars} prompt chars")),
            ..Self::new(TelemetryKind::QuerySent, job_id, Some(phase))
        }
    }

    #[must_use]
    pub fn reasoning_observed(
        job_id: &JobId,
        phase: PhaseId,
        model: &str,
        reasoning_tokens: u64,
        reasoning_chars: usize,
    ) -> Self {
        Self {
            model: Some(model.to_string()),
            tokens: reasoning_tokens,
            detail: Some(format!("{reasoning_chars} reasoning chars")),
            ..Self::new(TelemetryKind::ReasoningObserved, job_id, Some(phase))
        }
    }

    #[must_use]
    pub fn response_received(
        job_id: &JobId,
        phase: PhaseId,
        model: &str,
        tokens: u64,
        cost_usd: f64,
    ) -> Self {
        Self {
            model: Some(model.to_string()),
            tokens,
            cost_usd,
            ..Self::new(TelemetryKind::ResponseReceived, job_id, Some(phase))
        }
    }

    #[must_use]
    pub fn system_note(job_id: &JobId, phase: Option<PhaseId>, note: impl Into<String>) -> Self {
        Self {
            detail: Some(note.into()),
            ..Self::new(TelemetryKind::SystemNote, job_id, phase)
        }
    }
}

/// Destination for telemetry events. `emit` must not block.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Events become `tracing` events under the `fabula::telemetry` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        let phase = event.phase.map_or("-", |p| p.as_str());
        let model = event.model.as_deref().unwrap_or("-");
        let detail = event.detail.as_deref().unwrap_or("");
        match event.kind {
            TelemetryKind::SystemNote => info!(
                target: "fabula::telemetry",
                kind = event.kind.as_str(),
                job_id = %event.job_id,
                phase,
                "{detail}"
            ),
            _ => debug!(
                target: "fabula::telemetry",
                kind = event.kind.as_str(),
                job_id = %event.job_id,
                phase,
                model,
                tokens = event.tokens,
                cost_usd = event.cost_usd,
                "{detail}"
            ),
        }
    }
}

/// Keeps events in memory. Used by tests and embedders that inspect runs.
#[derive(Debug, Default)]
pub struct CollectingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CollectingTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    #[must_use]
    pub fn count(&self, kind: TelemetryKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

impl TelemetrySink for CollectingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Bounded channel drained by a background task that appends JSON lines.
///
/// `emit` uses `try_send`: when the queue is full the event is dropped and
/// counted. Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct ChannelTelemetry {
    tx: mpsc::Sender<TelemetryEvent>,
    dropped: Arc<AtomicU64>,
}

/// Background writer of a [`ChannelTelemetry`]. Finishes once every sender
/// has been dropped and the queue is drained.
#[derive(Debug)]
pub struct TelemetryWriter {
    task: JoinHandle<u64>,
}

impl TelemetryWriter {
    /// Wait for the writer to drain. Returns the number of lines written.
    pub async fn finish(self) -> u64 {
        self.task.await.unwrap_or(0)
    }
}

impl ChannelTelemetry {
    #[must_use]
    pub fn spawn(path: Utf8PathBuf, capacity: usize) -> (Self, TelemetryWriter) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(write_lines(path, rx));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            TelemetryWriter { task },
        )
    }

    /// Events dropped because the queue was full or the writer had stopped.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        if let Err(e) = self.tx.try_send(event) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(dropped_total = total, error = %e, "Telemetry event dropped");
        }
    }
}

async fn write_lines(path: Utf8PathBuf, mut rx: mpsc::Receiver<TelemetryEvent>) -> u64 {
    if let Some(parent) = path.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        warn!(path = %parent, error = %e, "Cannot create telemetry directory; events will be discarded");
    }

    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(path = %path, error = %e, "Cannot open telemetry file; events will be discarded");
            None
        }
    };

    let mut written = 0;
    while let Some(event) = rx.recv().await {
        let Some(out) = file.as_mut() else { continue };
        let mut line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "Unserializable telemetry event");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = out.write_all(line.as_bytes()).await {
            warn!(path = %path, error = %e, "Telemetry write failed; disabling sink");
            file = None;
            continue;
        }
        written += 1;
    }

    if let Some(mut out) = file
        && let Err(e) = out.flush().await
    {
        debug!(error = %e, "Telemetry flush failed");
    }
    written
}

/// Sink selected by `[telemetry]`. The writer is returned for the JSONL
/// sink only; await it after the last sender is dropped.
#[must_use]
pub fn sink_from_config(
    config: &TelemetryConfig,
    home: &FabulaHome,
) -> (Arc<dyn TelemetrySink>, Option<TelemetryWriter>) {
    match config.sink {
        TelemetrySinkKind::Tracing => (Arc::new(TracingTelemetry), None),
        TelemetrySinkKind::Off => (Arc::new(NullTelemetry), None),
        TelemetrySinkKind::Jsonl => {
            let (sink, writer) =
                ChannelTelemetry::spawn(home.telemetry_file(), config.channel_capacity);
            (Arc::new(sink), Some(writer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job() -> JobId {
        JobId::parse("alpha").unwrap()
    }

    #[tokio::test]
    async fn test_channel_sink_writes_json_lines() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("telemetry/events.jsonl")).unwrap();

        let (sink, writer) = ChannelTelemetry::spawn(path.clone(), 16);
        sink.emit(TelemetryEvent::query_sent(&job(), PhaseId::DnaExtraction, "m", 120));
        sink.emit(TelemetryEvent::response_received(
            &job(),
            PhaseId::DnaExtraction,
            "m",
            300,
            0.01,
        ));
        drop(sink);
        assert_eq!(writer.finish().await, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let events: Vec<TelemetryEvent> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events[0].kind, TelemetryKind::QuerySent);
        assert_eq!(events[1].tokens, 300);
        assert!(content.contains("\"kind\":\"response_received\""));
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("events.jsonl")).unwrap();
        let (sink, writer) = ChannelTelemetry::spawn(path, 1);

        // The writer task cannot run between these synchronous calls on a
        // current-thread runtime, so the second and third are dropped.
        for _ in 0..3 {
            sink.emit(TelemetryEvent::system_note(&job(), None, "note"));
        }
        assert_eq!(sink.dropped(), 2);
        drop(sink);
        assert_eq!(writer.finish().await, 1);
    }

    #[test]
    fn test_collecting_sink_counts_kinds() {
        let sink = CollectingTelemetry::new();
        sink.emit(TelemetryEvent::system_note(&job(), None, "interrupted"));
        sink.emit(TelemetryEvent::reasoning_observed(
            &job(),
            PhaseId::CharacterProfiles,
            "m",
            12,
            400,
        ));
        assert_eq!(sink.count(TelemetryKind::SystemNote), 1);
        assert_eq!(sink.count(TelemetryKind::QuerySent), 0);
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn test_null_and_tracing_sinks_accept_events() {
        NullTelemetry.emit(TelemetryEvent::system_note(&job(), None, "x"));
        TracingTelemetry.emit(TelemetryEvent::system_note(&job(), Some(PhaseId::CoverArt), "x"));
    }
}
