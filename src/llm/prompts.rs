use tracing::warn;

use crate::models::{InitialNotes, ParticipantId, PersonalTheme, Stage};

/// System prompt shared by every stage
pub const SYSTEM_PROMPT: &str = r#"You are an expert qualitative researcher specializing in Interpretative Phenomenological Analysis (IPA).

You MUST follow these rules:

1. Ground every claim in the participant's own words.
2. Quote extracts verbatim from the material you are given; never invent quotes.
3. Output MUST be a single valid JSON value matching the requested shape.
4. Do not add commentary before or after the JSON."#;

/// Build the stage 1 prompt (close reading of the raw transcript)
pub fn build_initial_notes_prompt(participant: &ParticipantId, transcript: &str) -> String {
    let mut prompt = stage_header(Stage::InitialNotes, Some(participant));

    prompt.push_str("Read the interview transcript closely, several times. Make notes about:\n");
    prompt.push_str("- observations and reflections on what the participant says\n");
    prompt.push_str("- language use, context, and initial interpretative comments\n");
    prompt.push_str("- distinctive phrases and emotional responses\n");
    prompt.push_str("- personal reflexivity comments, if relevant\n\n");

    prompt.push_str("## Transcript\n");
    prompt.push_str(transcript.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## Output\n");
    prompt.push_str("Return one JSON object with exactly these keys, each an array of strings:\n");
    for field in InitialNotes::FIELDS {
        prompt.push_str(&format!("- {}\n", field));
    }

    prompt
}

/// Build the stage 2 prompt from validated initial notes
pub fn build_statements_prompt(participant: &ParticipantId, notes: &InitialNotes) -> String {
    let mut prompt = stage_header(Stage::ExperientialStatements, Some(participant));

    prompt.push_str("Transform the initial notes below into experiential statements: concise\n");
    prompt.push_str("phrases at a higher level of abstraction, grounded in the participant's account.\n\n");

    prompt.push_str("## Initial Notes\n");
    prompt.push_str("```json\n");
    prompt.push_str(&to_pretty_json(notes));
    prompt.push_str("\n```\n\n");

    prompt.push_str("## Output\n");
    prompt.push_str("Return a JSON array of strings, one experiential statement per element.\n");

    prompt
}

/// Build the stage 3 prompt from validated experiential statements
pub fn build_personal_themes_prompt(participant: &ParticipantId, statements: &[String]) -> String {
    let mut prompt = stage_header(Stage::PersonalThemes, Some(participant));

    prompt.push_str("Identify connections between the experiential statements below and cluster\n");
    prompt.push_str("them into personal experiential themes. Describe each theme, support it with\n");
    prompt.push_str("extracts, and add analytic comments.\n\n");

    prompt.push_str("## Experiential Statements\n");
    prompt.push_str("```json\n");
    prompt.push_str(&to_pretty_json(statements));
    prompt.push_str("\n```\n\n");

    prompt.push_str("## Output\n");
    prompt.push_str("Return a JSON array of objects with these keys:\n");
    prompt.push_str("- theme_title (string)\n");
    prompt.push_str("- description (string)\n");
    prompt.push_str("- extracts (array of strings)\n");
    prompt.push_str("- analytic_comments (array of strings)\n");

    prompt
}

/// Build the stage 4 prompt embedding every surviving participant's themes
pub fn build_group_themes_prompt(pets: &[(ParticipantId, Vec<PersonalTheme>)]) -> String {
    let mut prompt = stage_header(Stage::GroupThemes, None);

    prompt.push_str(&format!(
        "Synthesize the personal experiential themes of {} participants into group\n",
        pets.len()
    ));
    prompt.push_str("experiential themes. Look for convergence and divergence across participants.\n");
    prompt.push_str("Attribute every extract to the participant it came from.\n\n");

    for (participant, themes) in pets {
        prompt.push_str(&format!("## Participant {}\n", participant));
        prompt.push_str("```json\n");
        prompt.push_str(&to_pretty_json(themes));
        prompt.push_str("\n```\n\n");
    }

    prompt.push_str("## Output\n");
    prompt.push_str("Return a JSON array of objects with these keys:\n");
    prompt.push_str("- theme_title (string)\n");
    prompt.push_str("- description (string)\n");
    prompt.push_str("- subthemes (array of objects):\n");
    prompt.push_str("  - subtheme_title (string)\n");
    prompt.push_str("  - description (string)\n");
    prompt.push_str("  - participant_contributions (array of objects):\n");
    prompt.push_str("    - participant_id (string, one of the ids above)\n");
    prompt.push_str("    - extracts (array of strings)\n");
    prompt.push_str("    - analytic_comments (array of strings)\n");

    prompt
}

fn stage_header(stage: Stage, participant: Option<&ParticipantId>) -> String {
    let mut header = format!("# Stage {}: {}\n", stage.number(), stage.name());
    if let Some(participant) = participant {
        header.push_str(&format!("Participant: {}\n", participant));
    }
    header.push('\n');
    header
}

/// Prior stage output as embedded in a prompt; `[]` if it cannot be encoded
fn to_pretty_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        warn!(error = %e, "prior stage output could not be embedded in prompt");
        "[]".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_notes_prompt_lists_all_keys() {
        let prompt = build_initial_notes_prompt(&"P1".into(), "  I felt invisible.  ");
        assert!(prompt.starts_with("# Stage 1: initial notes\nParticipant: P1\n"));
        assert!(prompt.contains("I felt invisible."));
        for field in InitialNotes::FIELDS {
            assert!(prompt.contains(&format!("- {}\n", field)));
        }
    }

    #[test]
    fn test_statements_prompt_embeds_notes() {
        let notes = InitialNotes {
            emotional_responses: vec!["shame".to_string()],
            ..Default::default()
        };
        let prompt = build_statements_prompt(&"P2".into(), &notes);
        assert!(prompt.contains("\"emotional_responses\": [\n    \"shame\"\n  ]"));
    }

    #[test]
    fn test_group_prompt_tags_each_participant() {
        let theme = PersonalTheme {
            theme_title: "Isolation".to_string(),
            description: "Cut off".to_string(),
            extracts: vec!["nobody called".to_string()],
            analytic_comments: vec![],
        };
        let pets: Vec<(ParticipantId, Vec<PersonalTheme>)> = vec![
            ("P1".into(), vec![theme.clone()]),
            ("P3".into(), vec![theme]),
        ];

        let prompt = build_group_themes_prompt(&pets);
        assert!(prompt.starts_with("# Stage 4: group experiential themes\n\n"));
        assert!(prompt.contains("of 2 participants"));
        assert!(prompt.contains("## Participant P1\n"));
        assert!(prompt.contains("## Participant P3\n"));
        assert!(!prompt.contains("Participant: "));
    }

    struct Unencodable;

    impl serde::Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    #[test]
    fn test_unencodable_stage_output_falls_back_to_empty_array() {
        assert_eq!(to_pretty_json(&Unencodable), "[]");
        assert_eq!(to_pretty_json(&["kept"]), "[\n  \"kept\"\n]");
    }
}
