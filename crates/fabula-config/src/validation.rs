use fabula_utils::error::ConfigError;
use fabula_utils::types::PhaseId;

use crate::model::Config;

impl Config {
    /// Check cross-field invariants. All problems are collected and reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.defaults.call_timeout_secs == 0 {
            errors.push("defaults.call_timeout_secs must be greater than 0".to_string());
        }
        if self.defaults.max_attempts == 0 {
            errors.push("defaults.max_attempts must be at least 1".to_string());
        }
        if !self.profiles.contains_key(&self.defaults.profile) {
            errors.push(format!(
                "defaults.profile '{}' is not a defined profile (available: {})",
                self.defaults.profile,
                self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if self.memory.enabled && self.memory.retrieve_limit == 0 {
            errors.push("memory.retrieve_limit must be at least 1 when memory is enabled".to_string());
        }
        if self.telemetry.channel_capacity == 0 {
            errors.push("telemetry.channel_capacity must be at least 1".to_string());
        }

        for (name, set) in &self.profiles {
            for phase in PhaseId::ALL.into_iter().filter(|p| !p.is_image_phase()) {
                match set.for_phase(phase) {
                    None => errors.push(format!("profiles.{name}.{phase} is missing")),
                    Some(profile) => {
                        if profile.model_id.trim().is_empty() {
                            errors.push(format!("profiles.{name}.{phase}.model_id is empty"));
                        }
                        if profile.max_output_tokens == 0 {
                            errors.push(format!(
                                "profiles.{name}.{phase}.max_output_tokens must be greater than 0"
                            ));
                        }
                    }
                }
            }
        }

        let mut backends = vec![("images.primary", &self.images.primary)];
        if let Some(secondary) = &self.images.secondary {
            backends.push(("images.secondary", secondary));
        }
        for (key, backend) in backends {
            if !backend.base_url.starts_with("http://") && !backend.base_url.starts_with("https://")
            {
                errors.push(format!("{key}.base_url must be an http(s) URL"));
            }
            if backend.model.trim().is_empty() {
                errors.push(format!("{key}.model is empty"));
            }
        }

        for (model, price) in &self.pricing {
            if price.input_per_mtok < 0.0 || price.output_per_mtok < 0.0 || price.per_image < 0.0 {
                errors.push(format!("pricing.\"{model}\" has a negative price"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }
}
