//! Phase graph for fabula.
//!
//! The graph is fixed: four text phases followed by the cover-art image
//! phase. Each text phase implements [`Phase`], which covers the two
//! phase-specific steps of the pipeline. Assembling inputs from committed
//! checkpoints, calling the gateway and interpreting the response are the
//! orchestrator's job.
//!
//! | Phase | Prompt inputs | Post-processing |
//! |---|---|---|
//! | `dna_extraction` | source document | none |
//! | `character_profiles` | DNA | none |
//! | `narrative_structure` | DNA, characters | unknown character ids dropped |
//! | `production_plan` | DNA, characters, structure | none |
//! | `cover_art` | DNA, plan | deterministic image prompt |

mod cover_art;
mod inputs;
mod narrative;
mod phase;
mod prompt;
mod sanitize;

use fabula_utils::types::PhaseId;

pub use cover_art::{cover_art_record, cover_prompt, cover_prompt_from_inputs};
pub use inputs::{InputError, PhaseInputs};
pub use narrative::{CharactersPhase, DnaPhase, PlanPhase, StructurePhase};
pub use phase::{Phase, PhaseContext, PhaseOutput};
pub use prompt::{JSON_OUTPUT_RULES, render_records, render_traces};
pub use sanitize::sanitize_structure;

/// The text phase implementing `id`. `None` for the image phase.
#[must_use]
pub fn text_phase(id: PhaseId) -> Option<Box<dyn Phase>> {
    match id {
        PhaseId::DnaExtraction => Some(Box::new(DnaPhase::new())),
        PhaseId::CharacterProfiles => Some(Box::new(CharactersPhase::new())),
        PhaseId::NarrativeStructure => Some(Box::new(StructurePhase::new())),
        PhaseId::ProductionPlan => Some(Box::new(PlanPhase::new())),
        PhaseId::CoverArt => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_text_phase() {
        for id in PhaseId::ALL {
            match text_phase(id) {
                Some(phase) => {
                    assert_eq!(phase.id(), id);
                    assert_eq!(phase.deps(), id.deps());
                }
                None => assert!(id.is_image_phase()),
            }
        }
    }
}
