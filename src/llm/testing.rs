//! In-memory provider and observer for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::client::{CompletionOptions, CompletionProvider, ProviderFailure};
use super::observer::{AttemptOutcome, AttemptRecord, CompletionObserver};

type Responder = Box<dyn Fn(&str, &CompletionOptions) -> Result<String, ProviderFailure> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<Result<String, ProviderFailure>>>),
    Responder(Responder),
}

/// Provider that replays canned responses and records every request
pub struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<(String, CompletionOptions)>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    /// Replay responses in order; a drained queue yields a fatal error
    pub fn new(responses: Vec<Result<String, ProviderFailure>>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(responses.into())),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Compute each response from the prompt and options
    pub fn from_fn(
        responder: impl Fn(&str, &CompletionOptions) -> Result<String, ProviderFailure>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            script: Script::Responder(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every request open for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most requests that were ever outstanding at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<(String, CompletionOptions)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn send(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ProviderFailure> {
        self.requests
            .lock()
            .unwrap()
            .push((prompt.to_string(), options.clone()));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderFailure::Fatal("script exhausted".into()))),
            Script::Responder(responder) => responder(prompt, options),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

/// Observer that keeps every record for inspection
#[derive(Default)]
pub struct RecordingObserver {
    attempts: Mutex<Vec<AttemptRecord>>,
    backoffs: Mutex<Vec<(u32, Duration)>>,
}

impl RecordingObserver {
    pub fn outcomes(&self) -> Vec<AttemptOutcome> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.outcome)
            .collect()
    }

    pub fn backoffs(&self) -> usize {
        self.backoffs.lock().unwrap().len()
    }
}

impl CompletionObserver for RecordingObserver {
    fn on_attempt(&self, record: &AttemptRecord) {
        self.attempts.lock().unwrap().push(record.clone());
    }

    fn on_backoff(&self, attempt: u32, wait: Duration) {
        self.backoffs.lock().unwrap().push((attempt, wait));
    }
}
