use tracing::info;

use super::round_trip::request_stage;
use crate::error::StageError;
use crate::llm::{build_initial_notes_prompt, CompletionClient, CompletionOptions};
use crate::models::{InitialNotes, Stage, Transcript};

/// Execute Stage 1: close reading of the raw transcript
///
/// Notes with every category empty count as a failed stage.
pub async fn execute_stage1(
    client: &CompletionClient,
    transcript: &Transcript,
    options: &CompletionOptions,
) -> Result<InitialNotes, StageError> {
    let participant = transcript.participant();
    info!(
        %participant,
        words = transcript.word_count(),
        "Stage 1: generating initial notes"
    );

    let prompt = build_initial_notes_prompt(participant, transcript.text());
    let notes: InitialNotes = request_stage(client, Stage::InitialNotes, &prompt, options).await?;

    if notes.is_empty() {
        return Err(StageError::EmptyResult);
    }

    info!(%participant, notes = notes.note_count(), "Stage 1 complete");
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ExtractionError;
    use crate::llm::testing::ScriptedProvider;
    use crate::models::ParticipantId;

    fn transcript() -> Transcript {
        Transcript::new(ParticipantId::from_position(0), "I kept it all inside.")
    }

    #[tokio::test]
    async fn test_stage1_parses_notes_with_prose() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(r#"Here are my notes:
            {"observations": ["speaks quietly"], "reflections": [], "language_use": [],
             "context": [], "interpretative_comments": [], "distinctive_phrases": ["all inside"],
             "emotional_responses": [], "reflexivity_comments": [],}"#
            .to_string())]));
        let client = CompletionClient::new(provider.clone());

        let notes = execute_stage1(&client, &transcript(), &CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(notes.observations, vec!["speaks quietly"]);
        assert_eq!(notes.distinctive_phrases, vec!["all inside"]);
        assert!(provider.prompts()[0].contains("I kept it all inside."));
    }

    #[tokio::test]
    async fn test_stage1_missing_key_fails() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"{"observations": ["x"]}"#.to_string()
        )]));
        let client = CompletionClient::new(provider);

        let err = execute_stage1(&client, &transcript(), &CompletionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StageError::Extraction(ExtractionError::SchemaMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_stage1_all_empty_is_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(r#"{"observations": [],
            "reflections": [], "language_use": [], "context": [], "interpretative_comments": [],
            "distinctive_phrases": [], "emotional_responses": [], "reflexivity_comments": []}"#
            .to_string())]));
        let client = CompletionClient::new(provider);

        let err = execute_stage1(&client, &transcript(), &CompletionOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, StageError::EmptyResult);
    }
}
