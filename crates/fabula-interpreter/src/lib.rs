//! Structured output interpreter for fabula.
//!
//! Model responses are free text that is supposed to contain one JSON
//! object. [`interpret`] turns that text into a [`StructuredRecord`] for the
//! phase, in three steps:
//!
//! 1. **Strict**: strip markdown fences, extract the outermost object,
//!    deserialize and validate against the phase schema.
//! 2. **Repair** (only when strict fails): close an unterminated string,
//!    drop a dangling trailing comma, append missing `}`/`]` in nesting
//!    order, and try again.
//! 3. **Default**: substitute the phase's documented safe default.
//!
//! Steps 2 and 3 mark the result degraded
//! ([`InterpretationQuality::Repaired`] / [`InterpretationQuality::Defaulted`]).
//!
//! [`InterpretationQuality::Repaired`]: fabula_utils::types::InterpretationQuality::Repaired
//! [`InterpretationQuality::Defaulted`]: fabula_utils::types::InterpretationQuality::Defaulted

mod defaults;
mod extract;
mod interpret;
mod repair;
mod schemas;

pub use defaults::{PLACEHOLDER_CHARACTER_ID, safe_default};
pub use extract::{Extraction, extract_json_object, strip_code_fences};
pub use interpret::{Interpretation, interpret};
pub use repair::{Repair, repair_json};
pub use schemas::{
    Chapter, Character, CharacterProfiles, CoverArt, CoverImage, Milestone, NarrativeDna,
    NarrativeStructure, ProductionPlan, RecordError, StructuredRecord,
};
