use std::collections::HashSet;

use tracing::{info, warn};

use super::round_trip::request_stage;
use crate::error::{PipelineError, StageError};
use crate::llm::{build_group_themes_prompt, CompletionClient, CompletionOptions};
use crate::models::{GroupTheme, ParticipantId, PersonalTheme, Stage};

/// Execute Stage 4: synthesize group themes across participants
///
/// Requires at least one participant; with none, returns
/// [`PipelineError::InsufficientData`] without issuing a request.
pub async fn aggregate(
    client: &CompletionClient,
    pets: &[(ParticipantId, Vec<PersonalTheme>)],
    options: &CompletionOptions,
) -> Result<Vec<GroupTheme>, PipelineError> {
    if pets.is_empty() {
        warn!("Stage 4 skipped: no participant completed stage 3");
        return Err(PipelineError::InsufficientData { failures: vec![] });
    }

    info!(
        participants = pets.len(),
        themes = pets.iter().map(|(_, t)| t.len()).sum::<usize>(),
        "Stage 4: synthesizing group themes"
    );

    let prompt = build_group_themes_prompt(pets);
    let themes = request_group_themes(client, &prompt, options)
        .await
        .map_err(|source| PipelineError::StageFailed {
            participant: None,
            stage: Stage::GroupThemes,
            source,
        })?;

    warn_on_unknown_participants(pets, &themes);

    info!(themes = themes.len(), "Stage 4 complete");
    Ok(themes)
}

async fn request_group_themes(
    client: &CompletionClient,
    prompt: &str,
    options: &CompletionOptions,
) -> Result<Vec<GroupTheme>, StageError> {
    let themes: Vec<GroupTheme> =
        request_stage(client, Stage::GroupThemes, prompt, options).await?;

    if themes.is_empty() {
        return Err(StageError::EmptyResult);
    }
    Ok(themes)
}

/// Contributions citing ids that were not part of the input are kept but flagged
fn warn_on_unknown_participants(pets: &[(ParticipantId, Vec<PersonalTheme>)], themes: &[GroupTheme]) {
    let known: HashSet<&ParticipantId> = pets.iter().map(|(p, _)| p).collect();

    for theme in themes {
        for cited in theme.cited_participants() {
            if !known.contains(cited) {
                warn!(
                    theme = %theme.theme_title,
                    participant = %cited,
                    "group theme cites a participant that was not analysed"
                );
            }
        }
    }
}
