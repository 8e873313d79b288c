use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::{aggregate, execute_stage1, execute_stage2, execute_stage3};
use crate::error::{PipelineError, StageError};
use crate::io::RejectedTranscript;
use crate::llm::{CompletionClient, CompletionOptions};
use crate::models::{
    GroupTheme, InitialNotes, ParticipantId, PersonalTheme, Stage, StageResult, Transcript,
};

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Options for every stage request
    pub options: CompletionOptions,
    /// Output budget for the single stage 3 retry after unparseable output
    pub stage3_retry_max_tokens: u32,
    /// Maximum participant pipelines running at once
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(CompletionOptions::default())
    }
}

impl PipelineConfig {
    /// Config with the stage 3 retry budget set to half the base budget
    pub fn new(options: CompletionOptions) -> Self {
        Self {
            stage3_retry_max_tokens: (options.max_tokens / 2).max(1),
            options,
            concurrency: 2,
        }
    }
}

/// Stages 1-3 output for one participant
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantAnalysis {
    pub participant: ParticipantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub initial_notes: InitialNotes,
    pub experiential_statements: Vec<String>,
    pub personal_themes: Vec<PersonalTheme>,
    #[serde(skip)]
    pub history: Vec<StageResult>,
}

/// A participant excluded from aggregation, and why
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantFailure {
    pub participant: ParticipantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Failing stage number, absent if no stage ran to completion or failure
    pub stage: Option<u8>,
    pub reason: String,
    #[serde(skip)]
    pub error: PipelineError,
    #[serde(skip)]
    pub history: Vec<StageResult>,
}

impl ParticipantFailure {
    fn new(transcript: &Transcript, error: PipelineError, history: Vec<StageResult>) -> Self {
        Self {
            participant: transcript.participant().clone(),
            source: transcript.source().map(str::to_string),
            stage: error.stage().map(|s| s.number()),
            reason: error.to_string(),
            error,
            history,
        }
    }

    /// Failure for a file that never became a transcript
    fn rejected(rejected: &RejectedTranscript) -> Self {
        let error = PipelineError::Rejected {
            participant: rejected.participant.clone(),
            reason: rejected.error.to_string(),
        };
        Self {
            participant: rejected.participant.clone(),
            source: rejected
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            stage: None,
            reason: error.to_string(),
            error,
            history: Vec::new(),
        }
    }
}

/// Canonical result of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub run_id: String,
    pub generated_at: String,
    pub model: String,
    pub participants: Vec<ParticipantAnalysis>,
    pub failures: Vec<ParticipantFailure>,
    pub group_themes: Vec<GroupTheme>,
    /// Stage 4 entry of the run history
    #[serde(skip)]
    pub group_result: StageResult,
}

impl AnalysisReport {
    /// Add files rejected at ingestion to the failures, keeping input order
    pub fn record_rejected(&mut self, rejected: &[RejectedTranscript]) {
        self.failures.extend(rejected.iter().map(ParticipantFailure::rejected));
        self.failures
            .sort_by_key(|f| f.participant.ordinal().unwrap_or(usize::MAX));
    }
}

/// Runs stages 1-3 per transcript and stage 4 across participants
#[derive(Clone)]
pub struct StagePipeline {
    client: CompletionClient,
    config: PipelineConfig,
}

impl StagePipeline {
    pub fn new(client: CompletionClient, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run stages 1-3 for one transcript, stopping at the first failure
    pub async fn run_stages(
        &self,
        transcript: &Transcript,
    ) -> Result<ParticipantAnalysis, PipelineError> {
        self.run_participant(transcript).await.map_err(|f| f.error)
    }

    /// Combine personal themes into group themes (stage 4)
    pub async fn aggregate(
        &self,
        pets: &[(ParticipantId, Vec<PersonalTheme>)],
    ) -> Result<Vec<GroupTheme>, PipelineError> {
        aggregate(&self.client, pets, &self.config.options).await
    }

    /// Analyse every transcript, then synthesize group themes.
    ///
    /// Participant pipelines run concurrently up to `config.concurrency`.
    /// Failed participants are reported and skipped; the run only fails if
    /// none survive stage 3 or if stage 4 itself fails.
    pub async fn run_batch(
        &self,
        transcripts: Vec<Transcript>,
    ) -> Result<AnalysisReport, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(transcripts.len());

        info!(
            transcripts = transcripts.len(),
            concurrency = self.config.concurrency.max(1),
            "Starting analysis run"
        );

        for transcript in transcripts {
            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let waiting = transcript.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let error = PipelineError::Interrupted {
                            participant: transcript.participant().clone(),
                            message: e.to_string(),
                        };
                        return Err(ParticipantFailure::new(&transcript, error, Vec::new()));
                    }
                };
                pipeline.run_participant(&transcript).await
            });
            handles.push((waiting, handle));
        }

        let mut participants = Vec::new();
        let mut failures = Vec::new();

        for (transcript, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| {
                let error = PipelineError::Interrupted {
                    participant: transcript.participant().clone(),
                    message: e.to_string(),
                };
                Err(ParticipantFailure::new(&transcript, error, Vec::new()))
            });

            match outcome {
                Ok(analysis) => participants.push(analysis),
                Err(failure) => {
                    warn!(
                        participant = %failure.participant,
                        stage = ?failure.stage,
                        reason = %failure.reason,
                        "Participant excluded from aggregation"
                    );
                    failures.push(failure);
                }
            }
        }

        if participants.is_empty() {
            error!(failed = failures.len(), "No participant completed stage 3");
            return Err(PipelineError::InsufficientData {
                failures: failures.into_iter().map(|f| f.participant).collect(),
            });
        }

        let pets: Vec<(ParticipantId, Vec<PersonalTheme>)> = participants
            .iter()
            .map(|a| (a.participant.clone(), a.personal_themes.clone()))
            .collect();
        let group_themes = self.aggregate(&pets).await?;
        let group_result = StageResult::valid(
            Stage::GroupThemes,
            None,
            history_value(Stage::GroupThemes, None, &group_themes),
        );

        info!(
            participants = participants.len(),
            failed = failures.len(),
            group_themes = group_themes.len(),
            "Analysis run complete"
        );

        Ok(AnalysisReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            model: self.config.options.model.clone(),
            participants,
            failures,
            group_themes,
            group_result,
        })
    }

    /// S1 -> S2 -> S3 -> Done, or Failed at the first stage error
    async fn run_participant(
        &self,
        transcript: &Transcript,
    ) -> Result<ParticipantAnalysis, ParticipantFailure> {
        let participant = transcript.participant();
        let options = &self.config.options;
        let mut history = Vec::with_capacity(3);

        let notes = execute_stage1(&self.client, transcript, options).await;
        let notes = self.record(transcript, Stage::InitialNotes, notes, &mut history)?;

        let statements = execute_stage2(&self.client, participant, &notes, options).await;
        let statements =
            self.record(transcript, Stage::ExperientialStatements, statements, &mut history)?;

        let themes = execute_stage3(
            &self.client,
            participant,
            &statements,
            options,
            self.config.stage3_retry_max_tokens,
        )
        .await;
        let themes = self.record(transcript, Stage::PersonalThemes, themes, &mut history)?;

        Ok(ParticipantAnalysis {
            participant: participant.clone(),
            source: transcript.source().map(str::to_string),
            initial_notes: notes,
            experiential_statements: statements,
            personal_themes: themes,
            history,
        })
    }

    /// Append a stage outcome to the history, converting failures into the
    /// participant's terminal state
    fn record<T: Serialize>(
        &self,
        transcript: &Transcript,
        stage: Stage,
        result: Result<T, StageError>,
        history: &mut Vec<StageResult>,
    ) -> Result<T, ParticipantFailure> {
        let participant = transcript.participant();

        match result {
            Ok(value) => {
                let json = history_value(stage, Some(participant), &value);
                history.push(StageResult::valid(stage, Some(participant.clone()), json));
                Ok(value)
            }
            Err(source) => {
                history.push(StageResult::failed(stage, Some(participant.clone()), &source));
                let error = PipelineError::StageFailed {
                    participant: Some(participant.clone()),
                    stage,
                    source,
                };
                Err(ParticipantFailure::new(transcript, error, std::mem::take(history)))
            }
        }
    }
}

/// Snapshot of a stage output for the history; `Null` if it cannot be encoded
fn history_value<T: Serialize>(
    stage: Stage,
    participant: Option<&ParticipantId>,
    value: &T,
) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(
            %stage,
            participant = participant.map(ParticipantId::as_str),
            error = %e,
            "stage output could not be recorded in history"
        );
        serde_json::Value::Null
    })
}
