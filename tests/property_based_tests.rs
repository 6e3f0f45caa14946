//! Property-based tests for the structured output interpreter.
//!
//! ## Configuration
//!
//! - `PROPTEST_CASES`: Number of test cases per property (default: 64)
//! - `PROPTEST_MAX_SHRINK_ITERS`: Max shrinking iterations on failure (default: 1000)
//!
//! ```bash
//! PROPTEST_CASES=256 cargo test --test property_based_tests
//! ```

use proptest::prelude::*;
use serde_json::{Map, Value};
use std::env;

use fabula_interpreter::{StructuredRecord, interpret, repair_json};
use fabula_utils::types::{InterpretationQuality, PhaseId};

const DEFAULT_PROPTEST_CASES: u32 = 64;
const DEFAULT_MAX_SHRINK_ITERS: u32 = 1000;

/// A `ProptestConfig` that respects `PROPTEST_CASES` and
/// `PROPTEST_MAX_SHRINK_ITERS`, optionally capped at `max_cases`.
fn proptest_config(max_cases: Option<u32>) -> ProptestConfig {
    let env_cases = env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_PROPTEST_CASES);

    let env_shrink_iters = env::var("PROPTEST_MAX_SHRINK_ITERS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_MAX_SHRINK_ITERS);

    let cases = match max_cases {
        Some(max) => env_cases.min(max),
        None => env_cases,
    };

    ProptestConfig {
        cases,
        max_shrink_iters: env_shrink_iters,
        max_shrink_time: 30000,
        ..ProptestConfig::default()
    }
}

/// Arbitrary JSON values, nested a few levels deep.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ,:{}\\[\\]\"\\\\]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn arb_object() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z_]{1,8}", arb_json(), 0..5)
        .prop_map(|m| m.into_iter().collect())
}

/// A character list whose JSON ends in a run of nested closers.
fn arb_cast() -> impl Strategy<Value = Value> {
    let character = (
        "[a-z]{1,8}",
        "[A-Z][a-z]{1,8}( [A-Z][a-z]{1,8})?",
        prop::collection::vec("[a-z]{1,10}", 0..3),
    )
        .prop_map(|(id, name, traits)| {
            serde_json::json!({
                "id": id,
                "name": name,
                "role": "supporting",
                "traits": traits,
            })
        });
    prop::collection::vec(character, 1..4)
        .prop_map(|cast| serde_json::json!({ "characters": cast }))
}

fn arb_dna() -> impl Strategy<Value = Value> {
    (
        "[A-Z][a-z]{2,10}",
        "[A-Za-z ]{0,20}",
        prop::collection::vec("[a-z]{1,10}", 0..4),
    )
        .prop_map(|(genre, logline, themes)| {
            serde_json::json!({
                "genre": genre,
                "logline": logline,
                "themes": themes,
            })
        })
}

proptest! {
    #![proptest_config(proptest_config(None))]

    /// Dropping the final brace of any object is undone exactly.
    #[test]
    fn prop_missing_final_brace_is_restored(object in arb_object()) {
        let original = Value::Object(object);
        let json = serde_json::to_string(&original).unwrap();
        let truncated = &json[..json.len() - 1];

        let repair = repair_json(truncated).unwrap();
        prop_assert!(repair.appended.ends_with('}'), "appended repair must end with a closing brace");
        let repaired: Value = serde_json::from_str(&repair.text).unwrap();
        prop_assert_eq!(repaired, original);
    }

    /// Well-formed JSON never needs repair.
    #[test]
    fn prop_complete_json_is_left_alone(object in arb_object()) {
        let json = serde_json::to_string(&Value::Object(object)).unwrap();
        prop_assert!(repair_json(&json).is_none());
    }

    #[test]
    fn prop_truncated_dna_keeps_its_genre(dna in arb_dna()) {
        let json = serde_json::to_string_pretty(&dna).unwrap();
        let truncated = json.trim_end().trim_end_matches('}');

        let out = interpret(PhaseId::DnaExtraction, truncated);
        prop_assert_eq!(out.quality, InterpretationQuality::Repaired);
        let record = out.record.as_dna().unwrap();
        prop_assert_eq!(record.genre.as_str(), dna["genre"].as_str().unwrap());
    }

    /// Losing inner closers as well as the outer brace (`]}`, `}]}`, ...)
    /// still interprets to the record the complete output describes.
    #[test]
    fn prop_lost_inner_closers_interpret_to_the_full_record(
        cast in arb_cast(),
        cut in 1usize..=4,
    ) {
        let json = serde_json::to_string(&cast).unwrap();
        let truncated = &json[..json.len() - cut];
        prop_assert!(json[truncated.len()..].chars().all(|c| c == ']' || c == '}'), "truncated tail must consist only of closing delimiters");

        let expected = StructuredRecord::from_json_str(PhaseId::CharacterProfiles, &json).unwrap();
        let out = interpret(PhaseId::CharacterProfiles, truncated);
        prop_assert_eq!(out.quality, InterpretationQuality::Repaired);
        prop_assert_eq!(out.record, expected);
    }
}

proptest! {
    #![proptest_config(proptest_config(Some(128)))]

    /// Whatever the model says, every phase gets a schema-valid record.
    #[test]
    fn prop_interpret_always_yields_a_valid_record(raw in ".{0,200}") {
        for phase in [
            PhaseId::DnaExtraction,
            PhaseId::CharacterProfiles,
            PhaseId::NarrativeStructure,
            PhaseId::ProductionPlan,
        ] {
            let out = interpret(phase, &raw);
            prop_assert!(out.record.validate().is_ok());
            prop_assert_eq!(out.record.phase(), phase);
            if out.quality == InterpretationQuality::Defaulted {
                prop_assert!(!out.warnings.is_empty());
            }
        }
    }

    /// Cutting a valid record anywhere never produces a record for the
    /// wrong phase or an invalid one.
    #[test]
    fn prop_any_prefix_of_a_record_interprets(cut in 0usize..400) {
        let full = serde_json::json!({
            "characters": [
                {"id": "mara", "name": "Mara Quill", "role": "protagonist"},
                {"id": "eli", "name": "Eli \"the Quiet\" Strand", "role": "antagonist"}
            ]
        })
        .to_string();
        let end = full
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(full.len()))
            .take_while(|i| *i <= cut)
            .last()
            .unwrap_or(0);

        let out = interpret(PhaseId::CharacterProfiles, &full[..end]);
        prop_assert!(matches!(out.record, StructuredRecord::CharacterProfiles(_)));
        prop_assert!(out.record.validate().is_ok());
    }
}
