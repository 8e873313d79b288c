use std::fmt;

use serde::{Deserialize, Serialize};

use super::ParticipantId;
use crate::llm::StageSchema;

/// The four analytical stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Stage 1: close reading and initial notes
    InitialNotes,
    /// Stage 2: experiential statements
    ExperientialStatements,
    /// Stage 3: personal experiential themes (per participant)
    PersonalThemes,
    /// Stage 4: group experiential themes (across participants)
    GroupThemes,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::InitialNotes,
        Stage::ExperientialStatements,
        Stage::PersonalThemes,
        Stage::GroupThemes,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Self::InitialNotes => 1,
            Self::ExperientialStatements => 2,
            Self::PersonalThemes => 3,
            Self::GroupThemes => 4,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.number() == number)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialNotes => "initial notes",
            Self::ExperientialStatements => "experiential statements",
            Self::PersonalThemes => "personal experiential themes",
            Self::GroupThemes => "group experiential themes",
        }
    }

    /// Shape the stage's model output must satisfy
    pub fn schema(&self) -> StageSchema {
        match self {
            Self::InitialNotes => StageSchema::InitialNotes,
            Self::ExperientialStatements => StageSchema::ExperientialStatements,
            Self::PersonalThemes => StageSchema::PersonalThemes,
            Self::GroupThemes => StageSchema::GroupThemes,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.name())
    }
}

/// What a stage produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Schema-valid structured output
    Valid(serde_json::Value),
    /// Failure description
    Failed(String),
}

/// One entry in a participant's stage history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    /// Absent for the stage 4 group result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantId>,
    pub outcome: StageOutcome,
}

impl StageResult {
    pub fn valid(stage: Stage, participant: Option<ParticipantId>, value: serde_json::Value) -> Self {
        Self {
            stage,
            participant,
            outcome: StageOutcome::Valid(value),
        }
    }

    pub fn failed(stage: Stage, participant: Option<ParticipantId>, reason: impl fmt::Display) -> Self {
        Self {
            stage,
            participant,
            outcome: StageOutcome::Failed(reason.to_string()),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, StageOutcome::Valid(_))
    }
}
