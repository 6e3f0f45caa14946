use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Phase identifiers for the narrative analysis pipeline.
///
/// Phases execute in a fixed order with declared dependencies:
///
/// ```text
/// dna_extraction → character_profiles → narrative_structure → production_plan → cover_art
/// ```
///
/// - `DnaExtraction`: no dependencies (reads the source document)
/// - `CharacterProfiles`: requires `DnaExtraction`
/// - `NarrativeStructure`: requires `DnaExtraction` and `CharacterProfiles`
/// - `ProductionPlan`: requires `DnaExtraction`, `CharacterProfiles` and `NarrativeStructure`
/// - `CoverArt`: requires `DnaExtraction` and `ProductionPlan`
///
/// # Example
///
/// ```rust
/// use fabula_utils::types::PhaseId;
///
/// let phase = PhaseId::CharacterProfiles;
/// assert_eq!(phase.as_str(), "character_profiles");
/// assert_eq!(phase.deps(), &[PhaseId::DnaExtraction]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    /// Narrative metadata: genre, themes, tone, setting.
    DnaExtraction,
    /// Character dossiers with stable ids.
    CharacterProfiles,
    /// Chapter and scene architecture referencing known characters.
    NarrativeStructure,
    /// Production milestones, format and risks.
    ProductionPlan,
    /// Promotional artwork generated from the narrative DNA and plan.
    CoverArt,
}

impl PhaseId {
    /// All phases in topological order.
    pub const ALL: [PhaseId; 5] = [
        PhaseId::DnaExtraction,
        PhaseId::CharacterProfiles,
        PhaseId::NarrativeStructure,
        PhaseId::ProductionPlan,
        PhaseId::CoverArt,
    ];

    /// Canonical snake_case name used in checkpoints, memory and telemetry.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DnaExtraction => "dna_extraction",
            Self::CharacterProfiles => "character_profiles",
            Self::NarrativeStructure => "narrative_structure",
            Self::ProductionPlan => "production_plan",
            Self::CoverArt => "cover_art",
        }
    }

    /// One-based position in the pipeline.
    #[must_use]
    pub const fn ordinal(&self) -> u32 {
        match self {
            Self::DnaExtraction => 1,
            Self::CharacterProfiles => 2,
            Self::NarrativeStructure => 3,
            Self::ProductionPlan => 4,
            Self::CoverArt => 5,
        }
    }

    /// Phases that must be `completed` before this phase may run.
    #[must_use]
    pub const fn deps(&self) -> &'static [PhaseId] {
        match self {
            Self::DnaExtraction => &[],
            Self::CharacterProfiles => &[Self::DnaExtraction],
            Self::NarrativeStructure => &[Self::DnaExtraction, Self::CharacterProfiles],
            Self::ProductionPlan => &[
                Self::DnaExtraction,
                Self::CharacterProfiles,
                Self::NarrativeStructure,
            ],
            Self::CoverArt => &[Self::DnaExtraction, Self::ProductionPlan],
        }
    }

    /// Whether this phase calls the image backend instead of text completion.
    #[must_use]
    pub const fn is_image_phase(&self) -> bool {
        matches!(self, Self::CoverArt)
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown phase '{s}'; expected one of: {}",
                    Self::ALL
                        .iter()
                        .map(PhaseId::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// Lifecycle of a single phase within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl PhaseStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How faithfully a model response was turned into a structured record.
///
/// Anything other than `Clean` marks the phase as degraded even though its
/// status is `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpretationQuality {
    /// Strict parse succeeded.
    #[default]
    Clean,
    /// Parse succeeded after syntactic repair.
    Repaired,
    /// Repair failed; the phase's safe-default record was substituted.
    Defaulted,
}

impl InterpretationQuality {
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        !matches!(self, Self::Clean)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Repaired => "repaired",
            Self::Defaulted => "defaulted",
        }
    }
}

/// Token and byte accounting reported by the model gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Tokens spent on intermediate reasoning (subset of output on most providers).
    #[serde(default)]
    pub reasoning_tokens: u64,
    /// Bytes of binary payload returned (image generation).
    #[serde(default)]
    pub payload_bytes: u64,
}

impl Usage {
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Component-wise sum, saturating on overflow.
    #[must_use]
    pub const fn combined(&self, other: &Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
            reasoning_tokens: self.reasoning_tokens.saturating_add(other.reasoning_tokens),
            payload_bytes: self.payload_bytes.saturating_add(other.payload_bytes),
        }
    }
}

/// Error type for job id validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobIdError {
    #[error("Job ID is empty")]
    Empty,

    #[error("Job ID '{0}' contains characters outside [A-Za-z0-9._-]")]
    InvalidCharacters(String),

    #[error("Job ID '{0}' must not contain '..'")]
    Traversal(String),

    #[error("Job ID is longer than {max} characters")]
    TooLong { max: usize },
}

/// Maximum length of a job id (used as a directory name).
pub const MAX_JOB_ID_LEN: usize = 128;

/// Validated job identifier, safe to use as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Validate and wrap a raw job id.
    ///
    /// Accepts only `[A-Za-z0-9._-]`, rejects `..` and empty ids.
    pub fn parse(raw: &str) -> Result<Self, JobIdError> {
        if raw.is_empty() {
            return Err(JobIdError::Empty);
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(JobIdError::TooLong {
                max: MAX_JOB_ID_LEN,
            });
        }
        if raw.contains("..") {
            return Err(JobIdError::Traversal(raw.to_string()));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
        {
            return Err(JobIdError::InvalidCharacters(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = JobIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl FromStr for JobId {
    type Err = JobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// BLAKE3 hex digest of a document, used to detect source drift on resume.
#[must_use]
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}
