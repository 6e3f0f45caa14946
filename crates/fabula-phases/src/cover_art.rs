//! Phase 5: cover art.
//!
//! Unlike the text phases there is no model-written JSON to interpret. The
//! image prompt is built deterministically from the DNA and the production
//! plan, and the record is assembled from whichever image backend served
//! the request.

use fabula_interpreter::{CoverArt, CoverImage, NarrativeDna, ProductionPlan};
use fabula_llm::{ImageData, ImageResult};

use crate::inputs::{InputError, PhaseInputs};

const MAX_THEMES: usize = 3;

/// Image prompt for a job. Empty DNA or plan fields are skipped.
///
/// `fallback_title` is used when the DNA carries no title.
#[must_use]
pub fn cover_prompt(dna: &NarrativeDna, plan: &ProductionPlan, fallback_title: &str) -> String {
    let title = if dna.title.trim().is_empty() {
        fallback_title.trim()
    } else {
        dna.title.trim()
    };

    let mut opening = format!(
        "Cover artwork for \"{title}\", a {} story",
        dna.genre.trim().to_lowercase()
    );
    if !dna.subgenres.is_empty() {
        opening.push_str(&format!(" with {} elements", dna.subgenres.join(" and ")));
    }
    let mut parts = vec![opening];
    if !dna.tone.trim().is_empty() {
        parts.push(format!("Tone: {}", dna.tone.trim()));
    }
    if !dna.setting.trim().is_empty() {
        parts.push(format!("Setting: {}", dna.setting.trim()));
    }
    if !dna.themes.is_empty() {
        let themes: Vec<&str> = dna.themes.iter().take(MAX_THEMES).map(String::as_str).collect();
        parts.push(format!("Themes: {}", themes.join(", ")));
    }
    if let Some(scene) = plan.key_scenes.first() {
        parts.push(format!("Key image: {}", scene.trim()));
    }
    if !plan.format.trim().is_empty() {
        parts.push(format!("Styled as promotional art for a {}", plan.format.trim()));
    }
    parts.push("No text, titles or lettering in the image".to_string());

    let mut prompt = parts.join(". ");
    prompt.push('.');
    prompt
}

/// Image prompt from the phase's committed inputs.
///
/// # Errors
///
/// Returns `InputError::Missing` if the DNA or plan record is absent.
pub fn cover_prompt_from_inputs(
    inputs: &PhaseInputs,
    fallback_title: &str,
) -> Result<String, InputError> {
    Ok(cover_prompt(inputs.dna()?, inputs.plan()?, fallback_title))
}

/// Record stored for a successful image generation.
#[must_use]
pub fn cover_art_record(prompt: String, result: &ImageResult) -> CoverArt {
    let image = match &result.data {
        ImageData::Base64(data) => CoverImage {
            encoding: "base64".to_string(),
            data: data.clone(),
        },
        ImageData::Url(url) => CoverImage {
            encoding: "url".to_string(),
            data: url.clone(),
        },
    };
    CoverArt {
        prompt,
        backend: result.backend.clone(),
        model: result.model.clone(),
        image: Some(image),
        fallback_used: result.fallback_used,
        primary_error: result.primary_error.clone(),
    }
}
