use fabula_utils::types::{InterpretationQuality, PhaseId};
use tracing::{debug, warn};

use crate::defaults::safe_default;
use crate::extract::{Extraction, extract_json_object, strip_code_fences};
use crate::repair::repair_json;
use crate::schemas::StructuredRecord;

/// The record a phase produced, and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub record: StructuredRecord,
    pub quality: InterpretationQuality,
    pub warnings: Vec<String>,
}

impl Interpretation {
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.quality.is_degraded()
    }
}

/// Turn a raw model response into a record for `phase`.
///
/// Never fails: the strict parse is tried first, then a bounded repair,
/// and finally the phase's safe default.
pub fn interpret(phase: PhaseId, raw: &str) -> Interpretation {
    let body = strip_code_fences(raw);

    let (candidate, strict_error) = match extract_json_object(body) {
        Extraction::Complete(json) => match StructuredRecord::from_json_str(phase, json) {
            Ok(record) => {
                debug!(phase = %phase, "Strict parse succeeded");
                return Interpretation {
                    record,
                    quality: InterpretationQuality::Clean,
                    warnings: Vec::new(),
                };
            }
            Err(e) => (json, e.to_string()),
        },
        Extraction::Truncated(json) => (json, "response ends inside a JSON object".to_string()),
        Extraction::NotFound => return defaulted(phase, "response contains no JSON object"),
    };

    if let Some(repair) = repair_json(candidate) {
        match StructuredRecord::from_json_str(phase, &repair.text) {
            Ok(record) => {
                let summary = repair.describe();
                warn!(phase = %phase, repair = %summary, "Repaired malformed model output");
                return Interpretation {
                    record,
                    quality: InterpretationQuality::Repaired,
                    warnings: vec![format!("output repaired ({summary}): {strict_error}")],
                };
            }
            Err(e) => return defaulted(phase, &format!("{strict_error}; repair failed: {e}")),
        }
    }

    defaulted(phase, &strict_error)
}

fn defaulted(phase: PhaseId, reason: &str) -> Interpretation {
    warn!(phase = %phase, reason, "Model output unusable; substituting safe default");
    Interpretation {
        record: safe_default(phase),
        quality: InterpretationQuality::Defaulted,
        warnings: vec![format!("safe default used: {reason}")],
    }
}
