use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque participant identifier (`P1`, `P2`, ...) assigned by upload order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Build the identifier for a zero-based input position
    pub fn from_position(index: usize) -> Self {
        Self(format!("P{}", index + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 1-based input position, for ids built by [`Self::from_position`]
    pub fn ordinal(&self) -> Option<usize> {
        self.0.strip_prefix('P')?.parse().ok()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Raw interview text for one participant.
///
/// Immutable once created; cloning shares the underlying text.
#[derive(Debug, Clone)]
pub struct Transcript {
    participant: ParticipantId,
    source: Option<String>,
    text: Arc<str>,
}

impl Transcript {
    pub fn new(participant: ParticipantId, text: impl Into<Arc<str>>) -> Self {
        Self {
            participant,
            source: None,
            text: text.into(),
        }
    }

    /// Attach a label (usually the file name) used in diagnostics
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
