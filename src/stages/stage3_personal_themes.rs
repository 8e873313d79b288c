use tracing::{info, warn};

use super::round_trip::request_stage;
use crate::error::StageError;
use crate::llm::{build_personal_themes_prompt, CompletionClient, CompletionOptions};
use crate::models::{ParticipantId, PersonalTheme, Stage};

/// Execute Stage 3: cluster experiential statements into personal themes
///
/// If the first response cannot be parsed as JSON, the stage is retried once
/// with `retry_max_tokens` as the output budget. Rate limits, provider errors,
/// schema mismatches and empty results are not retried here.
pub async fn execute_stage3(
    client: &CompletionClient,
    participant: &ParticipantId,
    statements: &[String],
    options: &CompletionOptions,
    retry_max_tokens: u32,
) -> Result<Vec<PersonalTheme>, StageError> {
    info!(%participant, statements = statements.len(), "Stage 3: clustering personal themes");

    let prompt = build_personal_themes_prompt(participant, statements);

    let themes = match request_themes(client, &prompt, options).await {
        Err(e) if e.is_unparseable() => {
            warn!(
                %participant,
                error = %e,
                max_tokens = retry_max_tokens,
                "Stage 3 output unparseable; retrying with reduced budget"
            );
            request_themes(client, &prompt, &options.with_max_tokens(retry_max_tokens)).await?
        }
        other => other?,
    };

    info!(%participant, themes = themes.len(), "Stage 3 complete");
    Ok(themes)
}

async fn request_themes(
    client: &CompletionClient,
    prompt: &str,
    options: &CompletionOptions,
) -> Result<Vec<PersonalTheme>, StageError> {
    let themes: Vec<PersonalTheme> =
        request_stage(client, Stage::PersonalThemes, prompt, options).await?;

    if themes.is_empty() {
        return Err(StageError::EmptyResult);
    }
    Ok(themes)
}
