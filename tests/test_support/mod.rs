//! Shared fixtures for the integration tests: a scripted gateway, an
//! in-memory (or file-backed) checkpoint store and canned phase outputs for
//! the "Alpha" story.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use fabula_checkpoint::{CheckpointStore, JobRecord, MemoryCheckpointStore, PhaseRecord};
use fabula_config::Provider;
use fabula_engine::{
    CancellationFlag, CollectingTelemetry, JobSpec, OrchestratorHandle, PhaseOrchestrator,
};
use fabula_llm::{ModelGateway, ScriptedBackend, ScriptedImageBackend};
use fabula_memory::ReasoningMemory;
use fabula_utils::types::{JobId, PhaseId, PhaseStatus};

pub const ALPHA_SOURCE: &str = "Mara returns to the coastal town where her brother drowned. \
Eli, the harbour master, hides what he saw that night. June, Mara's estranged \
mother, wants only to sell the family house before winter.";

pub const DNA_JSON: &str = r#"{
  "genre": "Drama",
  "title": "Alpha",
  "subgenres": ["family drama"],
  "themes": ["grief", "secrets", "reconciliation"],
  "tone": "somber",
  "setting": "a fading coastal town",
  "logline": "A woman comes home to bury the past and finds it still breathing.",
  "target_audience": "adult"
}"#;

pub const CHARACTERS_JSON: &str = r#"{
  "characters": [
    {"id": "mara", "name": "Mara Quill", "role": "protagonist", "motivations": ["truth"]},
    {"id": "eli", "name": "Eli Strand", "role": "antagonist", "motivations": ["guilt"]},
    {"id": "june", "name": "June Quill", "role": "supporting", "motivations": ["escape"]}
  ]
}"#;

pub const STRUCTURE_JSON: &str = r#"{
  "structure_type": "five-act",
  "chapters": [
    {"number": 1, "title": "Low Tide", "character_ids": ["mara", "june"]},
    {"number": 2, "title": "The Harbour", "character_ids": ["mara", "eli"]},
    {"number": 3, "title": "Salt", "character_ids": ["june"]},
    {"number": 4, "title": "Confession", "character_ids": ["eli", "mara"]},
    {"number": 5, "title": "High Water", "character_ids": ["mara", "eli", "june"]}
  ]
}"#;

pub const PLAN_JSON: &str = r#"{
  "format": "limited series",
  "estimated_runtime_minutes": 300,
  "budget_tier": "mid",
  "key_scenes": ["the harbour confession"],
  "milestones": [{"name": "pre-production", "weeks": 8}]
}"#;

/// Canned clean output for a text phase.
pub fn clean_output(phase: PhaseId) -> &'static str {
    match phase {
        PhaseId::DnaExtraction => DNA_JSON,
        PhaseId::CharacterProfiles => CHARACTERS_JSON,
        PhaseId::NarrativeStructure => STRUCTURE_JSON,
        PhaseId::ProductionPlan | PhaseId::CoverArt => PLAN_JSON,
    }
}

pub const TEXT_PHASES: [PhaseId; 4] = [
    PhaseId::DnaExtraction,
    PhaseId::CharacterProfiles,
    PhaseId::NarrativeStructure,
    PhaseId::ProductionPlan,
];

/// Reasoning long and structured enough to clear the memory threshold.
pub fn strong_reasoning(topic: &str) -> String {
    let mut text = format!("First, I read the source closely to understand {topic}.\n");
    text.push_str("Then I listed every named person and their relationships.\n");
    text.push_str("Next I checked each claim against the text.\n");
    text.push_str("Finally I assembled the JSON record.\n");
    while text.chars().count() < 1600 {
        text.push_str("The evidence in the text supports this reading of the material. ");
    }
    text
}

pub fn job_id(raw: &str) -> JobId {
    JobId::parse(raw).unwrap()
}

/// Everything a test needs to drive and observe one orchestrator.
pub struct Harness {
    pub store: Arc<dyn CheckpointStore>,
    pub text: Arc<ScriptedBackend>,
    pub primary: Arc<ScriptedImageBackend>,
    pub secondary: Arc<ScriptedImageBackend>,
    pub telemetry: Arc<CollectingTelemetry>,
    pub cancel: CancellationFlag,
    pub handle: OrchestratorHandle,
}

pub struct HarnessBuilder {
    store: Arc<dyn CheckpointStore>,
    memory: Option<Arc<dyn ReasoningMemory>>,
    cover_art: bool,
    call_timeout: Duration,
    max_attempts: u32,
    text: ScriptedBackend,
}

impl HarnessBuilder {
    pub fn store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = store;
        self
    }

    pub fn memory(mut self, memory: Arc<dyn ReasoningMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn cover_art(mut self, enabled: bool) -> Self {
        self.cover_art = enabled;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn text_backend(mut self, backend: ScriptedBackend) -> Self {
        self.text = backend;
        self
    }

    pub fn build(self) -> Harness {
        let text = Arc::new(self.text);
        let primary = Arc::new(ScriptedImageBackend::new("primary"));
        let secondary = Arc::new(ScriptedImageBackend::new("secondary"));
        let telemetry = Arc::new(CollectingTelemetry::new());
        let cancel = CancellationFlag::new();

        let gateway = ModelGateway::builder()
            .text_backend(Provider::Anthropic, text.clone())
            .text_backend(Provider::OpenRouter, text.clone())
            .image_primary(primary.clone())
            .image_secondary(secondary.clone())
            .call_timeout(self.call_timeout)
            .max_attempts(self.max_attempts)
            .retry_backoff(Duration::ZERO)
            .build();

        let mut builder = PhaseOrchestrator::builder(self.store.clone(), Arc::new(gateway))
            .telemetry(telemetry.clone())
            .cancellation(cancel.clone());
        if let Some(memory) = self.memory {
            builder = builder.memory(memory);
        }

        Harness {
            store: self.store,
            text,
            primary,
            secondary,
            telemetry,
            cancel,
            handle: OrchestratorHandle::new(builder.build(), "baseline", self.cover_art),
        }
    }
}

impl Harness {
    /// Text phases only, in-memory store, one attempt per call.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            store: Arc::new(MemoryCheckpointStore::new()),
            memory: None,
            cover_art: false,
            call_timeout: Duration::from_secs(5),
            max_attempts: 1,
            text: ScriptedBackend::new(),
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Queue clean outputs for every text phase.
    pub fn script_clean_run(&self) {
        for phase in TEXT_PHASES {
            self.text.push_ok(phase, clean_output(phase));
        }
    }

    pub fn alpha_spec(&self) -> JobSpec {
        JobSpec::new(job_id("alpha"), ALPHA_SOURCE).with_title("Alpha")
    }

    pub fn phase(&self, job: &str, phase: PhaseId) -> PhaseRecord {
        self.store
            .get_phases(&job_id(job))
            .unwrap()
            .into_iter()
            .find(|r| r.name == phase)
            .unwrap()
    }

    pub fn job(&self, job: &str) -> JobRecord {
        self.store.load_job(&job_id(job)).unwrap().unwrap()
    }
}

/// A completed record carrying `json` as its stored output.
pub fn completed_record(phase: PhaseId, json: &str) -> PhaseRecord {
    PhaseRecord {
        status: PhaseStatus::Completed,
        output: Some(serde_json::from_str(json).unwrap()),
        attempts: 1,
        ..PhaseRecord::pending(phase)
    }
}
