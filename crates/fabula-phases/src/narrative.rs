//! The four text phases.

use fabula_interpreter::StructuredRecord;
use fabula_utils::types::PhaseId;

use crate::inputs::InputError;
use crate::phase::{Phase, PhaseContext, PhaseOutput};
use crate::prompt::{JSON_OUTPUT_RULES, render_records, render_traces};
use crate::sanitize::sanitize_structure;

fn with_rules(role: &str, schema: &str) -> String {
    format!("{role}\n\nSCHEMA:\n{schema}{JSON_OUTPUT_RULES}")
}

/// Dependency outputs followed by reference traces and the task line.
fn dependent_prompt(ctx: &PhaseContext<'_>, task: &str) -> String {
    format!(
        "# Prior analysis of \"{}\"\n\n{}{}# Task\n{task}\n",
        ctx.title,
        render_records(ctx.inputs.records()),
        render_traces(ctx.traces),
    )
}

/// Phase 1: narrative DNA from the source document.
#[derive(Debug, Clone, Default)]
pub struct DnaPhase;

impl DnaPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Phase for DnaPhase {
    fn id(&self) -> PhaseId {
        PhaseId::DnaExtraction
    }

    fn system_prompt(&self) -> String {
        with_rules(
            "You are a story analyst. Read the manuscript and extract its narrative DNA.",
            r#"{
  "genre": string (required, the primary genre),
  "title": string,
  "subgenres": [string],
  "themes": [string],
  "tone": string,
  "setting": string,
  "logline": string (one sentence),
  "target_audience": string
}"#,
        )
    }

    fn user_prompt(&self, ctx: &PhaseContext<'_>) -> Result<String, InputError> {
        Ok(format!(
            "# Manuscript: \"{}\"\n\n{}\n\n{}# Task\nExtract the narrative DNA of this manuscript.\n",
            ctx.title,
            ctx.source_text.trim(),
            render_traces(ctx.traces),
        ))
    }
}

/// Phase 2: character dossiers with stable ids.
#[derive(Debug, Clone, Default)]
pub struct CharactersPhase;

impl CharactersPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Phase for CharactersPhase {
    fn id(&self) -> PhaseId {
        PhaseId::CharacterProfiles
    }

    fn system_prompt(&self) -> String {
        with_rules(
            "You are a character development specialist. Build a profile for every significant character.",
            r#"{
  "characters": [
    {
      "id": string (required, stable snake_case id such as "char_mara"),
      "name": string (required),
      "role": string (protagonist, antagonist, supporting, ...),
      "description": string,
      "motivations": [string],
      "traits": [string],
      "arc": string
    }
  ] (at least one)
}"#,
        )
    }

    fn user_prompt(&self, ctx: &PhaseContext<'_>) -> Result<String, InputError> {
        ctx.inputs.dna()?;
        Ok(dependent_prompt(
            ctx,
            "Profile the characters of this story. Ids must be unique.",
        ))
    }
}

/// Phase 3: chapter architecture. Chapters may only reference characters
/// defined in phase 2; unknown references are dropped.
#[derive(Debug, Clone, Default)]
pub struct StructurePhase;

impl StructurePhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Phase for StructurePhase {
    fn id(&self) -> PhaseId {
        PhaseId::NarrativeStructure
    }

    fn system_prompt(&self) -> String {
        with_rules(
            "You are a story architect. Lay out the chapter structure of the work.",
            r#"{
  "chapters": [
    {
      "number": integer (required, starting at 1),
      "title": string,
      "summary": string,
      "character_ids": [string] (ids from the character profiles only),
      "beats": [string]
    }
  ] (at least one),
  "structure_type": string (e.g. "three-act"),
  "pacing_notes": string
}"#,
        )
    }

    fn user_prompt(&self, ctx: &PhaseContext<'_>) -> Result<String, InputError> {
        let characters = ctx.inputs.characters()?;
        let ids: Vec<&str> = characters.ids().collect();
        Ok(dependent_prompt(
            ctx,
            &format!(
                "Design the chapter structure. Reference characters only by these ids: {}.",
                ids.join(", ")
            ),
        ))
    }

    fn postprocess(
        &self,
        record: StructuredRecord,
        ctx: &PhaseContext<'_>,
    ) -> Result<PhaseOutput, InputError> {
        let StructuredRecord::NarrativeStructure(mut structure) = record else {
            return Ok(PhaseOutput::unchanged(record));
        };
        let warnings = sanitize_structure(&mut structure, ctx.inputs.characters()?);
        Ok(PhaseOutput {
            record: StructuredRecord::NarrativeStructure(structure),
            warnings,
        })
    }
}

/// Phase 4: adaptation and production plan.
#[derive(Debug, Clone, Default)]
pub struct PlanPhase;

impl PlanPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Phase for PlanPhase {
    fn id(&self) -> PhaseId {
        PhaseId::ProductionPlan
    }

    fn system_prompt(&self) -> String {
        with_rules(
            "You are a production planner. Turn the analysis into a plan for adapting the work.",
            r#"{
  "format": string (required, e.g. "feature film", "limited series"),
  "estimated_runtime_minutes": integer,
  "budget_tier": string (low, medium, high),
  "key_scenes": [string],
  "casting_notes": [string],
  "milestones": [{"name": string, "weeks": integer}],
  "risks": [string]
}"#,
        )
    }

    fn user_prompt(&self, ctx: &PhaseContext<'_>) -> Result<String, InputError> {
        ctx.inputs.structure()?;
        Ok(dependent_prompt(
            ctx,
            "Produce a production plan grounded in the structure and characters above.",
        ))
    }
}
