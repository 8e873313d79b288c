use tracing::info;

use super::round_trip::request_stage;
use crate::error::StageError;
use crate::llm::{build_statements_prompt, CompletionClient, CompletionOptions};
use crate::models::{InitialNotes, ParticipantId, Stage};

/// Execute Stage 2: turn initial notes into experiential statements
pub async fn execute_stage2(
    client: &CompletionClient,
    participant: &ParticipantId,
    notes: &InitialNotes,
    options: &CompletionOptions,
) -> Result<Vec<String>, StageError> {
    info!(%participant, "Stage 2: deriving experiential statements");

    let prompt = build_statements_prompt(participant, notes);
    let statements: Vec<String> =
        request_stage(client, Stage::ExperientialStatements, &prompt, options).await?;

    // Blank strings carry no analysis
    let statements: Vec<String> = statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if statements.is_empty() {
        return Err(StageError::EmptyResult);
    }

    info!(%participant, statements = statements.len(), "Stage 2 complete");
    Ok(statements)
}
