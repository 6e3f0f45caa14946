use fabula_utils::types::InterpretationQuality;

use crate::trace::MAX_QUALITY;

/// Heuristic 0-10 quality score for a reasoning trace.
///
/// | Rule | Effect |
/// |---|---|
/// | reasoning shorter than `min_chars` | 0 |
/// | interpretation `defaulted` | 0 |
/// | base | 5 |
/// | interpretation `clean` | +2 |
/// | at least `long_chars` | +1 |
/// | at least `very_long_chars` | +1 |
/// | three or more step-like lines | +1 |
/// | interpretation `repaired` | capped at 6 |
///
/// Only clean interpretations can reach the storage threshold of 8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceScorer {
    pub min_chars: usize,
    pub long_chars: usize,
    pub very_long_chars: usize,
    pub min_steps: usize,
}

impl Default for TraceScorer {
    fn default() -> Self {
        Self {
            min_chars: 80,
            long_chars: 400,
            very_long_chars: 1500,
            min_steps: 3,
        }
    }
}

const STEP_WORDS: [&str; 5] = ["first", "then", "next", "finally", "step"];

impl TraceScorer {
    #[must_use]
    pub fn score(&self, reasoning: &str, quality: InterpretationQuality) -> u8 {
        let reasoning = reasoning.trim();
        let chars = reasoning.chars().count();
        if chars < self.min_chars || quality == InterpretationQuality::Defaulted {
            return 0;
        }

        let mut score: u8 = 5;
        if quality == InterpretationQuality::Clean {
            score += 2;
        }
        if chars >= self.long_chars {
            score += 1;
        }
        if chars >= self.very_long_chars {
            score += 1;
        }
        if reasoning.lines().filter(|l| is_step_line(l)).count() >= self.min_steps {
            score += 1;
        }
        if quality == InterpretationQuality::Repaired {
            score = score.min(6);
        }
        score.min(MAX_QUALITY)
    }
}

/// Numbered (`1.`, `2)`), bulleted, or sequencing-word lines.
fn is_step_line(line: &str) -> bool {
    let line = line.trim_start();
    if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("• ") {
        return true;
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && matches!(line[digits..].chars().next(), Some('.' | ')')) {
        return true;
    }

    let lower = line.to_lowercase();
    STEP_WORDS.iter().any(|w| {
        lower.starts_with(w)
            && lower[w.len()..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_alphanumeric())
    })
}
