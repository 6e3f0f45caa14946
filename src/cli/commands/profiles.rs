//! `fabula profiles`.

use serde_json::{Value, json};

use fabula_config::{Config, ProfileSet};

use super::render::emit_json;
use crate::error::FabulaError;

pub fn execute_profiles_command(json: bool, config: &Config) -> Result<(), FabulaError> {
    if json {
        let sets: Vec<Value> = config.profiles.values().map(profile_json).collect();
        println!(
            "{}",
            emit_json(&json!({
                "default": config.defaults.profile,
                "profiles": sets,
            }))?
        );
        return Ok(());
    }

    print!("{}", format_profiles(config));
    Ok(())
}

fn profile_json(set: &ProfileSet) -> Value {
    json!({
        "name": set.name,
        "phases": set.phases,
        "image": set.image,
    })
}

fn format_profiles(config: &Config) -> String {
    let mut out = String::new();
    for set in config.profiles.values() {
        let marker = if set.name == config.defaults.profile {
            " (default)"
        } else {
            ""
        };
        out.push_str(&format!("{}{marker}\n", set.name));
        for (phase, profile) in &set.phases {
            out.push_str(&format!(
                "  {:<20} {:<10} {:<32} {}/{}  max {} tokens\n",
                phase.as_str(),
                profile.provider.as_str(),
                profile.model_id,
                profile.mode.as_str(),
                profile.reasoning_effort.as_str(),
                profile.max_output_tokens
            ));
        }
        out.push_str(&format!(
            "  {:<20} {} {}\n",
            "cover_art", set.image.size, set.image.quality
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_listed_with_default_marker() {
        let config = Config::default();
        let text = format_profiles(&config);
        assert!(text.contains("baseline (default)"));
        assert!(text.contains("fast"));
        assert!(text.contains("deep"));
        assert!(text.contains("character_profiles"));
    }

    #[test]
    fn test_profile_json_has_every_text_phase() {
        let config = Config::default();
        let value = profile_json(config.profile("baseline").unwrap());
        assert_eq!(value["phases"].as_object().unwrap().len(), 4);
    }
}
