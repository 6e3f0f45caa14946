use std::collections::HashSet;

use fabula_interpreter::{CharacterProfiles, NarrativeStructure};

/// Drop chapter references to character ids that `characters` does not
/// define. Returns one warning per dropped reference.
pub fn sanitize_structure(
    structure: &mut NarrativeStructure,
    characters: &CharacterProfiles,
) -> Vec<String> {
    let known: HashSet<&str> = characters.ids().collect();
    let mut warnings = Vec::new();

    for chapter in &mut structure.chapters {
        let number = chapter.number;
        chapter.character_ids.retain(|id| {
            let keep = known.contains(id.as_str());
            if !keep {
                warnings.push(format!(
                    "chapter {number}: dropped reference to unknown character '{id}'"
                ));
            }
            keep
        });
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabula_interpreter::{Chapter, Character};

    fn character(id: &str) -> Character {
        Character {
            id: id.to_string(),
            name: id.to_uppercase(),
            role: String::new(),
            description: String::new(),
            motivations: Vec::new(),
            traits: Vec::new(),
            arc: String::new(),
        }
    }

    fn chapter(number: u32, ids: &[&str]) -> Chapter {
        Chapter {
            number,
            title: String::new(),
            summary: String::new(),
            character_ids: ids.iter().map(|s| (*s).to_string()).collect(),
            beats: Vec::new(),
        }
    }

    #[test]
    fn test_unknown_ids_dropped_with_warnings() {
        let characters = CharacterProfiles {
            characters: vec![character("ana"), character("ben")],
        };
        let mut structure = NarrativeStructure {
            chapters: vec![chapter(1, &["ana", "ghost"]), chapter(2, &["ben"])],
            structure_type: String::new(),
            pacing_notes: String::new(),
        };

        let warnings = sanitize_structure(&mut structure, &characters);

        assert_eq!(structure.chapters[0].character_ids, vec!["ana"]);
        assert_eq!(structure.chapters[1].character_ids, vec!["ben"]);
        assert_eq!(
            warnings,
            vec!["chapter 1: dropped reference to unknown character 'ghost'"]
        );
    }

    #[test]
    fn test_clean_structure_untouched() {
        let characters = CharacterProfiles {
            characters: vec![character("ana")],
        };
        let mut structure = NarrativeStructure {
            chapters: vec![chapter(1, &["ana"])],
            structure_type: String::new(),
            pacing_notes: String::new(),
        };
        let before = structure.clone();
        assert!(sanitize_structure(&mut structure, &characters).is_empty());
        assert_eq!(structure, before);
    }
}
