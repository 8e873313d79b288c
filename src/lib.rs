pub mod error;
pub mod io;
pub mod llm;
pub mod models;
pub mod stages;

pub use error::{CompletionError, ExtractionError, IngestError, PipelineError, StageError};
pub use io::{
    load_transcripts, LoadedTranscripts, MarkdownReport, RejectedTranscript, TextReport,
};
pub use llm::{
    extract, AnthropicClient, AnthropicConfig, CompletionClient, CompletionOptions,
    CompletionProvider, StageSchema,
};
pub use models::{GroupTheme, InitialNotes, ParticipantId, PersonalTheme, Stage, Transcript};
pub use stages::{AnalysisReport, PipelineConfig, StagePipeline};
