//! Named record schemas, one per phase.
//!
//! Identity fields (a character's `id`, a chapter's `number`, the genre,
//! and so on) are required. Everything else carries `#[serde(default)]` so
//! a truncated response that was repaired still deserializes.

use fabula_utils::types::PhaseId;
use serde::{Deserialize, Serialize};

/// Phase 1: genre, themes and tone of the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeDna {
    pub genre: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subgenres: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub setting: String,
    #[serde(default)]
    pub logline: String,
    #[serde(default)]
    pub target_audience: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub motivations: Vec<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub arc: String,
}

/// Phase 2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProfiles {
    pub characters: Vec<Character>,
}

impl CharacterProfiles {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.characters.iter().map(|c| c.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Ids from the character profiles that appear in this chapter.
    #[serde(default)]
    pub character_ids: Vec<String>,
    #[serde(default)]
    pub beats: Vec<String>,
}

/// Phase 3
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeStructure {
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub structure_type: String,
    #[serde(default)]
    pub pacing_notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    #[serde(default)]
    pub weeks: u32,
}

/// Phase 4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionPlan {
    pub format: String,
    #[serde(default)]
    pub estimated_runtime_minutes: u32,
    #[serde(default)]
    pub budget_tier: String,
    #[serde(default)]
    pub key_scenes: Vec<String>,
    #[serde(default)]
    pub casting_notes: Vec<String>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub risks: Vec<String>,
}

/// Encoded image kept inline in the phase output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverImage {
    /// `base64` or `url`
    pub encoding: String,
    pub data: String,
}

/// Phase 5
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverArt {
    pub prompt: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub image: Option<CoverImage>,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default)]
    pub primary_error: Option<String>,
}

/// Interpreted output of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredRecord {
    NarrativeDna(NarrativeDna),
    CharacterProfiles(CharacterProfiles),
    NarrativeStructure(NarrativeStructure),
    ProductionPlan(ProductionPlan),
    CoverArt(CoverArt),
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{phase} output does not match its schema: {source}")]
    Schema {
        phase: PhaseId,
        #[source]
        source: serde_json::Error,
    },

    #[error("{phase} output is invalid: {reason}")]
    Invalid { phase: PhaseId, reason: String },

    #[error("expected a {expected} record, found {found}")]
    WrongPhase { expected: PhaseId, found: PhaseId },
}

impl StructuredRecord {
    #[must_use]
    pub const fn phase(&self) -> PhaseId {
        match self {
            Self::NarrativeDna(_) => PhaseId::DnaExtraction,
            Self::CharacterProfiles(_) => PhaseId::CharacterProfiles,
            Self::NarrativeStructure(_) => PhaseId::NarrativeStructure,
            Self::ProductionPlan(_) => PhaseId::ProductionPlan,
            Self::CoverArt(_) => PhaseId::CoverArt,
        }
    }

    /// Deserialize and validate a record for `phase`.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Schema` when the value does not deserialize and
    /// `RecordError::Invalid` when it deserializes but violates the schema's
    /// content rules.
    pub fn from_value(phase: PhaseId, value: serde_json::Value) -> Result<Self, RecordError> {
        let schema_err = |source| RecordError::Schema { phase, source };
        let record = match phase {
            PhaseId::DnaExtraction => {
                Self::NarrativeDna(serde_json::from_value(value).map_err(schema_err)?)
            }
            PhaseId::CharacterProfiles => {
                Self::CharacterProfiles(serde_json::from_value(value).map_err(schema_err)?)
            }
            PhaseId::NarrativeStructure => {
                Self::NarrativeStructure(serde_json::from_value(value).map_err(schema_err)?)
            }
            PhaseId::ProductionPlan => {
                Self::ProductionPlan(serde_json::from_value(value).map_err(schema_err)?)
            }
            PhaseId::CoverArt => Self::CoverArt(serde_json::from_value(value).map_err(schema_err)?),
        };
        record.validate()?;
        Ok(record)
    }

    /// Parse `json` text as a record for `phase`.
    ///
    /// # Errors
    ///
    /// See [`StructuredRecord::from_value`].
    pub fn from_json_str(phase: PhaseId, json: &str) -> Result<Self, RecordError> {
        let value = serde_json::from_str(json).map_err(|source| RecordError::Schema { phase, source })?;
        Self::from_value(phase, value)
    }

    /// Content rules beyond what serde enforces.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Invalid` describing the first violated rule.
    pub fn validate(&self) -> Result<(), RecordError> {
        let phase = self.phase();
        let invalid = |reason: &str| {
            Err(RecordError::Invalid {
                phase,
                reason: reason.to_string(),
            })
        };

        match self {
            Self::NarrativeDna(dna) if dna.genre.trim().is_empty() => invalid("genre is empty"),
            Self::CharacterProfiles(p) if p.characters.is_empty() => invalid("no characters"),
            Self::CharacterProfiles(p) if p.characters.iter().any(|c| c.id.trim().is_empty()) => {
                invalid("character with empty id")
            }
            Self::NarrativeStructure(s) if s.chapters.is_empty() => invalid("no chapters"),
            Self::ProductionPlan(plan) if plan.format.trim().is_empty() => invalid("format is empty"),
            Self::CoverArt(art) if art.prompt.trim().is_empty() => invalid("prompt is empty"),
            _ => Ok(()),
        }
    }

    /// JSON form stored in the checkpoint.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        let value = match self {
            Self::NarrativeDna(r) => serde_json::to_value(r),
            Self::CharacterProfiles(r) => serde_json::to_value(r),
            Self::NarrativeStructure(r) => serde_json::to_value(r),
            Self::ProductionPlan(r) => serde_json::to_value(r),
            Self::CoverArt(r) => serde_json::to_value(r),
        };
        // Plain structs of strings, numbers and vectors always serialize.
        value.unwrap_or(serde_json::Value::Null)
    }

    pub fn as_dna(&self) -> Option<&NarrativeDna> {
        match self {
            Self::NarrativeDna(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_characters(&self) -> Option<&CharacterProfiles> {
        match self {
            Self::CharacterProfiles(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<&NarrativeStructure> {
        match self {
            Self::NarrativeStructure(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_plan(&self) -> Option<&ProductionPlan> {
        match self {
            Self::ProductionPlan(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_cover_art(&self) -> Option<&CoverArt> {
        match self {
            Self::CoverArt(r) => Some(r),
            _ => None,
        }
    }
}
