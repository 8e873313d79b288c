//! Error types for the analysis pipeline.
//!
//! Stage-level failures are values: they are captured in [`PipelineError`]
//! and reported per participant instead of aborting the batch.

use std::path::PathBuf;

use crate::models::{ParticipantId, Stage};

/// Failure of a single completion request (after the retry budget is spent).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompletionError {
    /// The provider kept rate limiting until the retry budget ran out.
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// Non-retryable provider failure (auth, bad request, server, transport).
    #[error("provider error: {0}")]
    ProviderError(String),

    /// The request succeeded but the model returned no text.
    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Failure to turn raw model text into a schema-valid value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractionError {
    /// No parseable JSON could be recovered from the text.
    #[error("unparseable model output: {reason}")]
    Unparseable { reason: String, raw: String },

    /// The text parsed, but not into the shape the stage expects.
    #[error("schema mismatch: {reason}")]
    SchemaMismatch { reason: String, raw: String },
}

impl ExtractionError {
    pub fn unparseable(reason: impl Into<String>, raw: &str) -> Self {
        Self::Unparseable {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    pub fn schema_mismatch(reason: impl Into<String>, raw: &str) -> Self {
        Self::SchemaMismatch {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    /// The raw model text that failed extraction
    pub fn raw(&self) -> &str {
        match self {
            Self::Unparseable { raw, .. } | Self::SchemaMismatch { raw, .. } => raw,
        }
    }
}

/// Failure of one analytical stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Structurally valid output with nothing in it.
    #[error("stage produced an empty result")]
    EmptyResult,
}

impl StageError {
    /// Whether this failure came from JSON parsing, the only case that earns
    /// the reduced-budget stage 3 retry.
    pub fn is_unparseable(&self) -> bool {
        matches!(self, Self::Extraction(ExtractionError::Unparseable { .. }))
    }
}

/// Failure of a participant pipeline or of the whole run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// A stage failed; `participant` is `None` for the stage 4 group call.
    #[error("stage {} ({}) failed{}: {source}", .stage.number(), .stage.name(), participant_suffix(.participant))]
    StageFailed {
        participant: Option<ParticipantId>,
        stage: Stage,
        source: StageError,
    },

    /// No participant survived stages 1-3.
    #[error("insufficient data: no participant completed stage 3 ({} failed)", .failures.len())]
    InsufficientData { failures: Vec<ParticipantId> },

    /// The participant's file could not be loaded, so no stage ran.
    #[error("transcript for {participant} was rejected: {reason}")]
    Rejected {
        participant: ParticipantId,
        reason: String,
    },

    /// A participant task stopped before reaching a terminal state.
    #[error("pipeline for {participant} was interrupted: {message}")]
    Interrupted {
        participant: ParticipantId,
        message: String,
    },
}

impl PipelineError {
    /// Stage that failed, if the error is attributable to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

fn participant_suffix(participant: &Option<ParticipantId>) -> String {
    participant
        .as_ref()
        .map(|p| format!(" for {}", p))
        .unwrap_or_default()
}

/// Failure to load a transcript before it enters the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read transcript {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("transcript {label} is empty")]
    Empty { label: String },
}
