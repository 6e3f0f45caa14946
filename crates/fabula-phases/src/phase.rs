use fabula_interpreter::StructuredRecord;
use fabula_llm::Message;
use fabula_memory::ReasoningTrace;
use fabula_utils::types::{JobId, PhaseId};

use crate::inputs::{InputError, PhaseInputs};

/// Everything a phase may read while building its request.
#[derive(Debug, Clone, Copy)]
pub struct PhaseContext<'a> {
    pub job_id: &'a JobId,
    /// Job title as supplied by the caller.
    pub title: &'a str,
    /// The source document. Only the first phase puts it in its prompt.
    pub source_text: &'a str,
    pub inputs: &'a PhaseInputs,
    /// Reference traces retrieved from reasoning memory, best first.
    pub traces: &'a [ReasoningTrace],
}

/// A record after phase-specific post-processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutput {
    pub record: StructuredRecord,
    pub warnings: Vec<String>,
}

impl PhaseOutput {
    #[must_use]
    pub fn unchanged(record: StructuredRecord) -> Self {
        Self {
            record,
            warnings: Vec::new(),
        }
    }
}

/// A text phase: builds a completion request and post-processes the
/// interpreted record.
///
/// The split mirrors the pipeline: `messages()` runs before the gateway
/// call, `postprocess()` after the interpreter.
pub trait Phase: Send + Sync {
    fn id(&self) -> PhaseId;

    /// Phases that must be `completed` first.
    fn deps(&self) -> &'static [PhaseId] {
        self.id().deps()
    }

    /// Role description and output schema.
    fn system_prompt(&self) -> String;

    /// Task text built from the context.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if a dependency record is missing.
    fn user_prompt(&self, ctx: &PhaseContext<'_>) -> Result<String, InputError>;

    /// Messages sent to the gateway.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if a dependency record is missing.
    fn messages(&self, ctx: &PhaseContext<'_>) -> Result<Vec<Message>, InputError> {
        Ok(vec![
            Message::system(self.system_prompt()),
            Message::user(self.user_prompt(ctx)?),
        ])
    }

    /// Adjust the interpreted record using committed dependency outputs.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if a dependency record needed for the
    /// adjustment is missing.
    fn postprocess(
        &self,
        record: StructuredRecord,
        _ctx: &PhaseContext<'_>,
    ) -> Result<PhaseOutput, InputError> {
        Ok(PhaseOutput::unchanged(record))
    }
}
