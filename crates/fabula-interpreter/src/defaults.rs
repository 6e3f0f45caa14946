//! Safe-default records.
//!
//! Used when a phase's response cannot be parsed even after repair. Each
//! default is schema-valid so downstream phases can keep going; the phase
//! is marked degraded.
//!
//! | Phase | Default |
//! |---|---|
//! | `dna_extraction` | genre `Unknown`, title `Untitled`, no themes |
//! | `character_profiles` | one placeholder protagonist, id `char_placeholder` |
//! | `narrative_structure` | one chapter covering the whole work, no character references |
//! | `production_plan` | format `undetermined`, no scenes or milestones |
//! | `cover_art` | the prompt that was sent, no image |

use fabula_utils::types::PhaseId;

use crate::schemas::{
    Chapter, Character, CharacterProfiles, CoverArt, NarrativeDna, NarrativeStructure,
    ProductionPlan, StructuredRecord,
};

pub const PLACEHOLDER_CHARACTER_ID: &str = "char_placeholder";

const PLACEHOLDER_NOTE: &str = "Placeholder generated because the model response could not be interpreted.";

#[must_use]
pub fn safe_default(phase: PhaseId) -> StructuredRecord {
    match phase {
        PhaseId::DnaExtraction => StructuredRecord::NarrativeDna(NarrativeDna {
            genre: "Unknown".to_string(),
            title: "Untitled".to_string(),
            subgenres: Vec::new(),
            themes: Vec::new(),
            tone: "unknown".to_string(),
            setting: String::new(),
            logline: PLACEHOLDER_NOTE.to_string(),
            target_audience: String::new(),
        }),
        PhaseId::CharacterProfiles => StructuredRecord::CharacterProfiles(CharacterProfiles {
            characters: vec![Character {
                id: PLACEHOLDER_CHARACTER_ID.to_string(),
                name: "Unnamed Protagonist".to_string(),
                role: "protagonist".to_string(),
                description: PLACEHOLDER_NOTE.to_string(),
                motivations: Vec::new(),
                traits: Vec::new(),
                arc: String::new(),
            }],
        }),
        PhaseId::NarrativeStructure => StructuredRecord::NarrativeStructure(NarrativeStructure {
            chapters: vec![Chapter {
                number: 1,
                title: "Complete Work".to_string(),
                summary: PLACEHOLDER_NOTE.to_string(),
                character_ids: Vec::new(),
                beats: Vec::new(),
            }],
            structure_type: "undetermined".to_string(),
            pacing_notes: String::new(),
        }),
        PhaseId::ProductionPlan => StructuredRecord::ProductionPlan(ProductionPlan {
            format: "undetermined".to_string(),
            estimated_runtime_minutes: 0,
            budget_tier: "undetermined".to_string(),
            key_scenes: Vec::new(),
            casting_notes: Vec::new(),
            milestones: Vec::new(),
            risks: vec![PLACEHOLDER_NOTE.to_string()],
        }),
        PhaseId::CoverArt => StructuredRecord::CoverArt(CoverArt {
            prompt: "Cover art unavailable".to_string(),
            backend: String::new(),
            model: String::new(),
            image: None,
            fallback_used: false,
            primary_error: None,
        }),
    }
}
