use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use fabula_utils::types::PhaseId;

/// Profile set used when a job does not name one.
pub const DEFAULT_PROFILE: &str = "baseline";

/// Text completion provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenRouter,
}

impl Provider {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(format!(
                "unknown provider '{other}'; expected 'anthropic' or 'openrouter'"
            )),
        }
    }
}

/// Whether the backend is asked for an intermediate reasoning trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    #[default]
    Reasoning,
    Plain,
}

impl CompletionMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Plain => "plain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Thinking-token budget for providers that take an explicit budget.
    #[must_use]
    pub const fn budget_tokens(&self) -> u32 {
        match self {
            Self::Low => 2_048,
            Self::Medium => 8_192,
            Self::High => 16_384,
        }
    }
}

/// Model settings for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub model_id: String,
    pub provider: Provider,
    #[serde(default)]
    pub mode: CompletionMode,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    pub max_output_tokens: u32,
}

impl ModelProfile {
    #[must_use]
    pub fn new(
        provider: Provider,
        model_id: &str,
        mode: CompletionMode,
        reasoning_effort: ReasoningEffort,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            model_id: model_id.to_string(),
            provider,
            mode,
            reasoning_effort,
            max_output_tokens,
        }
    }
}

/// Settings passed to the image backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageProfile {
    pub size: String,
    pub quality: String,
}

impl Default for ImageProfile {
    fn default() -> Self {
        Self {
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
        }
    }
}

/// Named group of per-phase model profiles, selectable per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSet {
    pub name: String,
    pub phases: BTreeMap<PhaseId, ModelProfile>,
    pub image: ImageProfile,
}

impl ProfileSet {
    /// Profile for a text phase. `None` for the image phase or a missing entry.
    #[must_use]
    pub fn for_phase(&self, phase: PhaseId) -> Option<&ModelProfile> {
        self.phases.get(&phase)
    }
}

fn set(name: &str, entries: [(PhaseId, ModelProfile); 4], image: ImageProfile) -> ProfileSet {
    ProfileSet {
        name: name.to_string(),
        phases: entries.into_iter().collect(),
        image,
    }
}

/// Built-in profile sets: `baseline`, `fast` and `deep`.
#[must_use]
pub fn builtin_profiles() -> BTreeMap<String, ProfileSet> {
    use CompletionMode::{Plain, Reasoning};
    use PhaseId::*;
    use Provider::{Anthropic, OpenRouter};
    use ReasoningEffort::{High, Low, Medium};

    let sonnet = "claude-sonnet-4-5";
    let haiku = "claude-haiku-4-5";
    let opus = "claude-opus-4-1";

    let baseline = set(
        DEFAULT_PROFILE,
        [
            (DnaExtraction, ModelProfile::new(Anthropic, sonnet, Reasoning, Medium, 4_096)),
            (CharacterProfiles, ModelProfile::new(Anthropic, sonnet, Reasoning, Medium, 8_192)),
            (NarrativeStructure, ModelProfile::new(Anthropic, sonnet, Reasoning, High, 12_288)),
            (ProductionPlan, ModelProfile::new(Anthropic, haiku, Plain, Low, 4_096)),
        ],
        ImageProfile::default(),
    );

    let fast = set(
        "fast",
        [
            (DnaExtraction, ModelProfile::new(Anthropic, haiku, Plain, Low, 2_048)),
            (CharacterProfiles, ModelProfile::new(Anthropic, haiku, Plain, Low, 4_096)),
            (NarrativeStructure, ModelProfile::new(Anthropic, haiku, Plain, Low, 6_144)),
            (ProductionPlan, ModelProfile::new(Anthropic, haiku, Plain, Low, 2_048)),
        ],
        ImageProfile {
            size: "512x512".to_string(),
            quality: "standard".to_string(),
        },
    );

    let deep = set(
        "deep",
        [
            (DnaExtraction, ModelProfile::new(Anthropic, opus, Reasoning, High, 8_192)),
            (CharacterProfiles, ModelProfile::new(Anthropic, opus, Reasoning, High, 12_288)),
            (NarrativeStructure, ModelProfile::new(Anthropic, opus, Reasoning, High, 16_384)),
            (
                ProductionPlan,
                ModelProfile::new(OpenRouter, "openai/gpt-5", Reasoning, Medium, 8_192),
            ),
        ],
        ImageProfile {
            size: "1024x1536".to_string(),
            quality: "hd".to_string(),
        },
    );

    [baseline, fast, deep]
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_cover_every_text_phase() {
        for (name, set) in builtin_profiles() {
            for phase in PhaseId::ALL {
                if phase.is_image_phase() {
                    assert!(set.for_phase(phase).is_none(), "{name}: {phase}");
                } else {
                    assert!(set.for_phase(phase).is_some(), "{name}: {phase}");
                }
            }
        }
    }

    #[test]
    fn test_default_profile_is_builtin() {
        assert!(builtin_profiles().contains_key(DEFAULT_PROFILE));
    }

    #[test]
    fn test_budget_grows_with_effort() {
        assert!(ReasoningEffort::Low.budget_tokens() < ReasoningEffort::Medium.budget_tokens());
        assert!(ReasoningEffort::Medium.budget_tokens() < ReasoningEffort::High.budget_tokens());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("Anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!("openrouter".parse::<Provider>().unwrap(), Provider::OpenRouter);
        assert!("gemini".parse::<Provider>().is_err());
    }
}
