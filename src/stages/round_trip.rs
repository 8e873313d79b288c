use serde::de::DeserializeOwned;

use crate::error::{ExtractionError, StageError};
use crate::llm::{extract, CompletionClient, CompletionOptions};
use crate::models::Stage;

/// One completion plus extraction for a stage, decoded into its typed output.
///
/// Every failure comes back as a [`StageError`]; nothing here panics.
pub async fn request_stage<T: DeserializeOwned>(
    client: &CompletionClient,
    stage: Stage,
    prompt: &str,
    options: &CompletionOptions,
) -> Result<T, StageError> {
    let raw = client.complete(prompt, options).await?;
    let value = extract(&raw, stage.schema())?;

    serde_json::from_value(value)
        .map_err(|e| ExtractionError::schema_mismatch(e.to_string(), &raw).into())
}
