//! Scripted backends for tests.
//!
//! Responses are queued per phase and consumed in order; every invocation
//! is recorded so tests can assert exactly which phases reached the
//! gateway. An empty queue answers with `Misconfiguration`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fabula_utils::types::{PhaseId, Usage};

use crate::error::GatewayError;
use crate::types::{
    ImageBackend, ImageData, ImageOutput, ImageRequest, LlmBackend, LlmInvocation, LlmResult,
};

type Script = VecDeque<Result<LlmResult, GatewayError>>;

#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<PhaseId, Script>>,
    invocations: Mutex<Vec<LlmInvocation>>,
    calls: AtomicUsize,
    usage: Usage,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage reported with every scripted text response.
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Sleep before answering, to exercise timeouts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(&self, phase: PhaseId, text: impl Into<String>) {
        let result = LlmResult::new(text, "scripted", "scripted-model").with_usage(self.usage);
        self.push(phase, Ok(result));
    }

    pub fn push_ok_with_reasoning(
        &self,
        phase: PhaseId,
        text: impl Into<String>,
        reasoning: impl Into<String>,
    ) {
        let result = LlmResult::new(text, "scripted", "scripted-model")
            .with_usage(self.usage)
            .with_reasoning(reasoning);
        self.push(phase, Ok(result));
    }

    pub fn push_err(&self, phase: PhaseId, error: GatewayError) {
        self.push(phase, Err(error));
    }

    pub fn push(&self, phase: PhaseId, outcome: Result<LlmResult, GatewayError>) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(phase)
            .or_default()
            .push_back(outcome);
    }

    /// Total invocations across all phases.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, phase: PhaseId) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|inv| inv.phase == phase)
            .count()
    }

    pub fn invocations(&self) -> Vec<LlmInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let phase = inv.phase;
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(inv);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&phase)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| {
            Err(GatewayError::Misconfiguration(format!(
                "no scripted response left for phase '{phase}'"
            )))
        })
    }
}

pub struct ScriptedImageBackend {
    name: String,
    script: Mutex<VecDeque<Result<Option<ImageData>, GatewayError>>>,
    calls: AtomicUsize,
}

impl ScriptedImageBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push_ok(&self, data: ImageData) {
        self.push(Ok(Some(data)));
    }

    /// A successful response carrying no image.
    pub fn push_empty(&self) {
        self.push(Ok(None));
    }

    pub fn push_err(&self, error: GatewayError) {
        self.push(Err(error));
    }

    fn push(&self, outcome: Result<Option<ImageData>, GatewayError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageBackend for ScriptedImageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _request: ImageRequest) -> Result<ImageOutput, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Ok(data)) => Ok(ImageOutput {
                data,
                model_used: format!("{}-model", self.name),
            }),
            Some(Err(e)) => Err(e),
            None => Err(GatewayError::Misconfiguration(format!(
                "no scripted image left for backend '{}'",
                self.name
            ))),
        }
    }
}
