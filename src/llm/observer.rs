use std::time::Duration;

use tracing::{info, warn};

/// Result of one completion attempt, as seen by the observability sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    ProviderError,
    EmptyResponse,
}

/// One completion attempt
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub model: String,
    /// 1-based attempt number within a single `complete` call
    pub attempt: u32,
    pub prompt_chars: usize,
    pub response_chars: usize,
    pub latency: Duration,
    pub outcome: AttemptOutcome,
    pub detail: Option<String>,
}

/// Sink for completion telemetry.
///
/// Shared by every concurrent pipeline, so implementations must emit each
/// record atomically.
pub trait CompletionObserver: Send + Sync {
    fn on_attempt(&self, record: &AttemptRecord);

    fn on_backoff(&self, attempt: u32, wait: Duration);
}

/// Default sink: one `tracing` event per record
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CompletionObserver for TracingObserver {
    fn on_attempt(&self, record: &AttemptRecord) {
        let latency_ms = record.latency.as_millis() as u64;
        match record.outcome {
            AttemptOutcome::Success => info!(
                model = %record.model,
                attempt = record.attempt,
                prompt_chars = record.prompt_chars,
                response_chars = record.response_chars,
                latency_ms,
                "completion succeeded"
            ),
            outcome => warn!(
                model = %record.model,
                attempt = record.attempt,
                prompt_chars = record.prompt_chars,
                latency_ms,
                ?outcome,
                detail = record.detail.as_deref().unwrap_or(""),
                "completion attempt failed"
            ),
        }
    }

    fn on_backoff(&self, attempt: u32, wait: Duration) {
        warn!(
            attempt,
            wait_secs = wait.as_secs(),
            "rate limited; backing off before retry"
        );
    }
}
