use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fabula_utils::error::ConfigError;
use fabula_utils::types::PhaseId;

use crate::model::{
    Config, ConfigSource, ImageBackendConfig, ModelPrice, ProviderConfig, TelemetrySinkKind,
};
use crate::profiles::{
    CompletionMode, DEFAULT_PROFILE, ImageProfile, ModelProfile, ProfileSet, Provider,
    ReasoningEffort,
};

/// CLI-level overrides. Every field beats the config file.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub home: Option<Utf8PathBuf>,
    pub profile: Option<String>,
    pub call_timeout_secs: Option<u64>,
}

/// TOML configuration file structure. All sections and keys are optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    pub defaults: Option<TomlDefaults>,
    pub gateway: Option<TomlGateway>,
    pub images: Option<TomlImages>,
    pub pipeline: Option<TomlPipeline>,
    pub memory: Option<TomlMemory>,
    pub telemetry: Option<TomlTelemetry>,
    pub profiles: Option<BTreeMap<String, TomlProfileSet>>,
    pub pricing: Option<BTreeMap<String, ModelPrice>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlDefaults {
    pub profile: Option<String>,
    pub call_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub home: Option<Utf8PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlProvider {
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlGateway {
    pub anthropic: Option<TomlProvider>,
    pub openrouter: Option<TomlProvider>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlImages {
    pub primary: Option<ImageBackendConfig>,
    pub secondary: Option<ImageBackendConfig>,
    /// `false` disables the secondary backend entirely.
    pub fallback: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlPipeline {
    pub cover_art: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlMemory {
    pub enabled: Option<bool>,
    pub retrieve_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlTelemetry {
    pub sink: Option<TelemetrySinkKind>,
    pub channel_capacity: Option<usize>,
}

/// `[profiles.<name>]`: optional `image` table plus one table per text phase.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlProfileSet {
    pub image: Option<ImageProfile>,
    #[serde(flatten)]
    pub phases: BTreeMap<String, TomlModelProfile>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TomlModelProfile {
    pub model_id: Option<String>,
    pub provider: Option<Provider>,
    pub mode: Option<CompletionMode>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub max_output_tokens: Option<u32>,
}

impl TomlModelProfile {
    fn apply_to(&self, mut base: ModelProfile) -> ModelProfile {
        if let Some(model_id) = &self.model_id {
            base.model_id.clone_from(model_id);
        }
        if let Some(provider) = self.provider {
            base.provider = provider;
        }
        if let Some(mode) = self.mode {
            base.mode = mode;
        }
        if let Some(effort) = self.reasoning_effort {
            base.reasoning_effort = effort;
        }
        if let Some(max) = self.max_output_tokens {
            base.max_output_tokens = max;
        }
        base
    }
}

fn merge_provider(target: &mut ProviderConfig, file: Option<TomlProvider>) {
    if let Some(file) = file {
        if let Some(env) = file.api_key_env {
            target.api_key_env = env;
        }
        if let Some(url) = file.base_url {
            target.base_url = url;
        }
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults.
    ///
    /// Searches upward from the current directory unless `cli.config_path` is set.
    pub fn discover(cli: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli)
    }

    /// Path-driven variant of [`discover`](Self::discover).
    pub fn discover_from(start_dir: &Path, cli: &CliArgs) -> Result<Self> {
        let mut config = Config::default();
        for key in ["profile", "call_timeout_secs", "max_attempts", "home"] {
            config
                .source_attribution
                .insert(key.to_string(), ConfigSource::Defaults);
        }

        let config_path = match &cli.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            let file = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            config.apply_file(file, &ConfigSource::ConfigFile(path.clone()))?;
            tracing::debug!(path = %path.display(), "Loaded configuration file");
        }

        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document and merge it over the defaults (no discovery).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content)
            .map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        let mut config = Config::default();
        config.apply_file(file, &ConfigSource::ConfigFile(PathBuf::from("<inline>")))?;
        config.validate()?;
        Ok(config)
    }

    /// Find `.fabula/config.toml` starting at `start_dir` and walking up.
    ///
    /// Stops at the filesystem root or at the first repository root
    /// (`.git`, `.hg`, `.svn`).
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(".fabula").join("config.toml");
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }
            current = dir.parent();
        }

        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let parsed = toml::from_str(&content).map_err(|e| {
            ConfigError::InvalidFile(format!("{}: {e}", path.display()))
        })?;
        Ok(parsed)
    }

    fn apply_file(&mut self, file: TomlConfig, source: &ConfigSource) -> Result<()> {
        if let Some(d) = file.defaults {
            let attr = &mut self.source_attribution;
            if let Some(profile) = d.profile {
                self.defaults.profile = profile;
                attr.insert("profile".to_string(), source.clone());
            }
            if let Some(secs) = d.call_timeout_secs {
                self.defaults.call_timeout_secs = secs;
                attr.insert("call_timeout_secs".to_string(), source.clone());
            }
            if let Some(attempts) = d.max_attempts {
                self.defaults.max_attempts = attempts;
                attr.insert("max_attempts".to_string(), source.clone());
            }
            if let Some(home) = d.home {
                self.defaults.home = Some(home);
                attr.insert("home".to_string(), source.clone());
            }
        }

        if let Some(g) = file.gateway {
            merge_provider(&mut self.gateway.anthropic, g.anthropic);
            merge_provider(&mut self.gateway.openrouter, g.openrouter);
        }

        if let Some(images) = file.images {
            if let Some(primary) = images.primary {
                self.images.primary = primary;
            }
            if let Some(secondary) = images.secondary {
                self.images.secondary = Some(secondary);
            }
            if images.fallback == Some(false) {
                self.images.secondary = None;
            }
        }

        if let Some(p) = file.pipeline
            && let Some(cover_art) = p.cover_art
        {
            self.pipeline.cover_art = cover_art;
        }

        if let Some(m) = file.memory {
            if let Some(enabled) = m.enabled {
                self.memory.enabled = enabled;
            }
            if let Some(limit) = m.retrieve_limit {
                self.memory.retrieve_limit = limit;
            }
        }

        if let Some(t) = file.telemetry {
            if let Some(sink) = t.sink {
                self.telemetry.sink = sink;
            }
            if let Some(capacity) = t.channel_capacity {
                self.telemetry.channel_capacity = capacity;
            }
        }

        if let Some(profiles) = file.profiles {
            for (name, set) in profiles {
                self.merge_profile_set(name, set)?;
            }
        }

        if let Some(pricing) = file.pricing {
            self.pricing.extend(pricing);
        }

        Ok(())
    }

    /// Overlay a file profile set onto the built-in set of the same name, or
    /// onto `baseline` when the name is new.
    fn merge_profile_set(&mut self, name: String, file_set: TomlProfileSet) -> Result<()> {
        let mut merged = match self.profiles.get(&name) {
            Some(existing) => existing.clone(),
            None => {
                let base = self.profiles.get(DEFAULT_PROFILE).cloned().ok_or_else(|| {
                    ConfigError::UnknownProfile {
                        name: DEFAULT_PROFILE.to_string(),
                    }
                })?;
                ProfileSet {
                    name: name.clone(),
                    ..base
                }
            }
        };

        if let Some(image) = file_set.image {
            merged.image = image;
        }

        for (phase_name, overrides) in file_set.phases {
            let phase: PhaseId = phase_name.parse().map_err(|reason| {
                ConfigError::InvalidValue {
                    key: format!("profiles.{name}.{phase_name}"),
                    value: reason,
                }
            })?;
            if phase.is_image_phase() {
                return Err(ConfigError::InvalidValue {
                    key: format!("profiles.{name}.{phase_name}"),
                    value: "image settings belong under profiles.<name>.image".to_string(),
                }
                .into());
            }
            let base = merged.phases.get(&phase).cloned().ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: format!("profiles.{name}.{phase_name}"),
                    value: "no base profile to extend".to_string(),
                }
            })?;
            merged.phases.insert(phase, overrides.apply_to(base));
        }

        self.profiles.insert(name, merged);
        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(profile) = &cli.profile {
            self.defaults.profile.clone_from(profile);
            self.source_attribution
                .insert("profile".to_string(), ConfigSource::Cli);
        }
        if let Some(secs) = cli.call_timeout_secs {
            self.defaults.call_timeout_secs = secs;
            self.source_attribution
                .insert("call_timeout_secs".to_string(), ConfigSource::Cli);
        }
        if let Some(home) = &cli.home {
            self.defaults.home = Some(home.clone());
            self.source_attribution
                .insert("home".to_string(), ConfigSource::Cli);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let cfg_dir = dir.join(".fabula");
        fs::create_dir_all(&cfg_dir).unwrap();
        let path = cfg_dir.join("config.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_discover_without_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();

        let config = Config::discover_from(dir.path(), &CliArgs::default()).unwrap();

        assert_eq!(config.defaults.profile, "baseline");
        assert_eq!(
            config.source_attribution.get("profile"),
            Some(&ConfigSource::Defaults)
        );
    }

    #[test]
    fn test_discover_walks_upward() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), "[defaults]\nmax_attempts = 5\n");
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let found = Config::discover_config_file_from(&nested).unwrap();
        assert_eq!(found, Some(dir.path().join(".fabula/config.toml")));

        let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();
        assert_eq!(config.defaults.max_attempts, 5);
    }

    #[test]
    fn test_discovery_stops_at_repo_root() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), "[defaults]\nmax_attempts = 5\n");
        let repo = dir.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert_eq!(Config::discover_config_file_from(&repo).unwrap(), None);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            dir.path(),
            "[defaults]\nprofile = \"fast\"\ncall_timeout_secs = 30\n",
        );
        let cli = CliArgs {
            config_path: Some(path),
            profile: Some("deep".to_string()),
            ..CliArgs::default()
        };

        let config = Config::discover_from(dir.path(), &cli).unwrap();

        assert_eq!(config.defaults.profile, "deep");
        assert_eq!(config.defaults.call_timeout_secs, 30);
        assert_eq!(config.source_attribution.get("profile"), Some(&ConfigSource::Cli));
        assert!(matches!(
            config.source_attribution.get("call_timeout_secs"),
            Some(ConfigSource::ConfigFile(_))
        ));
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = TempDir::new().unwrap();
        let cli = CliArgs {
            config_path: Some(dir.path().join("nope.toml")),
            ..CliArgs::default()
        };
        let err = Config::discover_from(dir.path(), &cli).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_profile_override_merges_over_builtin() {
        let config = Config::from_toml_str(
            r#"
            [profiles.baseline.production_plan]
            model_id = "claude-sonnet-4-5"
            mode = "reasoning"
            "#,
        )
        .unwrap();

        let plan = config
            .profile("baseline")
            .unwrap()
            .for_phase(PhaseId::ProductionPlan)
            .unwrap();
        assert_eq!(plan.model_id, "claude-sonnet-4-5");
        assert_eq!(plan.mode, CompletionMode::Reasoning);
        assert_eq!(plan.provider, Provider::Anthropic);
    }

    #[test]
    fn test_new_profile_extends_baseline() {
        let config = Config::from_toml_str(
            r#"
            [profiles.cheap.dna_extraction]
            provider = "openrouter"
            model_id = "meta-llama/llama-3.3-70b-instruct"
            mode = "plain"

            [profiles.cheap.image]
            size = "512x512"
            quality = "draft"
            "#,
        )
        .unwrap();

        let cheap = config.profile("cheap").unwrap();
        assert_eq!(cheap.name, "cheap");
        assert_eq!(
            cheap.for_phase(PhaseId::DnaExtraction).unwrap().provider,
            Provider::OpenRouter
        );
        assert_eq!(cheap.image.size, "512x512");
        let baseline = config.profile("baseline").unwrap();
        assert_eq!(
            cheap.for_phase(PhaseId::CharacterProfiles),
            baseline.for_phase(PhaseId::CharacterProfiles)
        );
    }

    #[test]
    fn test_unknown_phase_in_profile_rejected() {
        let err = Config::from_toml_str("[profiles.baseline.review]\nmodel_id = \"x\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("profiles.baseline.review"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = Config::from_toml_str(
            "[profiles.baseline.dna_extraction]\nprovider = \"gemini\"\n",
        )
        .unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_images_fallback_can_be_disabled() {
        let config = Config::from_toml_str("[images]\nfallback = false\n").unwrap();
        assert!(config.images.secondary.is_none());
    }

    #[test]
    fn test_sections_parse() {
        let config = Config::from_toml_str(
            r#"
            [gateway.openrouter]
            base_url = "http://localhost:9999/v1/chat/completions"

            [pipeline]
            cover_art = false

            [memory]
            enabled = false

            [telemetry]
            sink = "jsonl"
            channel_capacity = 16

            [pricing."claude-haiku-4-5"]
            input_per_mtok = 1.0
            output_per_mtok = 5.0
            "#,
        )
        .unwrap();

        assert_eq!(
            config.gateway.openrouter.base_url,
            "http://localhost:9999/v1/chat/completions"
        );
        assert_eq!(config.gateway.openrouter.api_key_env, "OPENROUTER_API_KEY");
        assert!(!config.pipeline.cover_art);
        assert!(!config.memory.enabled);
        assert_eq!(config.telemetry.sink, TelemetrySinkKind::Jsonl);
        assert_eq!(config.pricing["claude-haiku-4-5"].output_per_mtok, 5.0);
    }
}
