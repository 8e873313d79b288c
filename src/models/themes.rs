use serde::{Deserialize, Serialize};

use super::ParticipantId;

/// Stage 1 output: close-reading annotations of one transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialNotes {
    pub observations: Vec<String>,
    pub reflections: Vec<String>,
    pub language_use: Vec<String>,
    pub context: Vec<String>,
    pub interpretative_comments: Vec<String>,
    pub distinctive_phrases: Vec<String>,
    pub emotional_responses: Vec<String>,
    pub reflexivity_comments: Vec<String>,
}

impl InitialNotes {
    /// Required keys of the stage 1 object, in prompt order
    pub const FIELDS: [&'static str; 8] = [
        "observations",
        "reflections",
        "language_use",
        "context",
        "interpretative_comments",
        "distinctive_phrases",
        "emotional_responses",
        "reflexivity_comments",
    ];

    /// Total number of notes across all categories
    pub fn note_count(&self) -> usize {
        self.sections().iter().map(|(_, notes)| notes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.note_count() == 0
    }

    /// Categories paired with their notes, in prompt order
    pub fn sections(&self) -> [(&'static str, &[String]); 8] {
        [
            (Self::FIELDS[0], self.observations.as_slice()),
            (Self::FIELDS[1], self.reflections.as_slice()),
            (Self::FIELDS[2], self.language_use.as_slice()),
            (Self::FIELDS[3], self.context.as_slice()),
            (Self::FIELDS[4], self.interpretative_comments.as_slice()),
            (Self::FIELDS[5], self.distinctive_phrases.as_slice()),
            (Self::FIELDS[6], self.emotional_responses.as_slice()),
            (Self::FIELDS[7], self.reflexivity_comments.as_slice()),
        ]
    }
}

/// Stage 3 output element: one Personal Experiential Theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalTheme {
    pub theme_title: String,
    pub description: String,
    pub extracts: Vec<String>,
    pub analytic_comments: Vec<String>,
}

/// Stage 4 output element: one Group Experiential Theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTheme {
    pub theme_title: String,
    pub description: String,
    pub subthemes: Vec<Subtheme>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtheme {
    pub subtheme_title: String,
    pub description: String,
    pub participant_contributions: Vec<ParticipantContribution>,
}

/// Evidence one participant contributes to a group subtheme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantContribution {
    pub participant_id: ParticipantId,
    pub extracts: Vec<String>,
    pub analytic_comments: Vec<String>,
}

impl GroupTheme {
    /// Participant ids cited anywhere under this theme
    pub fn cited_participants(&self) -> impl Iterator<Item = &ParticipantId> {
        self.subthemes
            .iter()
            .flat_map(|s| s.participant_contributions.iter())
            .map(|c| &c.participant_id)
    }
}
