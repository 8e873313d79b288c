use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::IngestError;
use crate::models::{ParticipantId, Transcript};

/// Decode transcript bytes as UTF-8, falling back to ISO-8859-1
pub fn decode_transcript(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text).to_string(),
        Err(e) => {
            debug!(error = %e, "transcript is not UTF-8; decoding as ISO-8859-1");
            // Every Latin-1 byte maps to the code point of the same value
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

/// Build a transcript from raw bytes, rejecting empty content
pub fn parse_transcript(
    bytes: &[u8],
    participant: ParticipantId,
    label: &str,
) -> Result<Transcript, IngestError> {
    let text = decode_transcript(bytes);
    if text.trim().is_empty() {
        return Err(IngestError::Empty {
            label: label.to_string(),
        });
    }

    Ok(Transcript::new(participant, text).with_source(label))
}

/// Read a transcript file
pub fn read_transcript_file(path: &Path, participant: ParticipantId) -> Result<Transcript, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    parse_transcript(&bytes, participant, &label)
}

/// A file that could not be turned into a transcript
#[derive(Debug)]
pub struct RejectedTranscript {
    /// Id the file would have had
    pub participant: ParticipantId,
    pub path: PathBuf,
    pub error: IngestError,
}

/// Transcripts loaded from a list of files
#[derive(Debug, Default)]
pub struct LoadedTranscripts {
    pub transcripts: Vec<Transcript>,
    pub rejected: Vec<RejectedTranscript>,
}

/// Load transcripts in order, assigning `P1`, `P2`, ... by position.
///
/// Unreadable or empty files are reported in `rejected`; the remaining files
/// keep the id of their original position.
pub fn load_transcripts(paths: &[PathBuf]) -> LoadedTranscripts {
    let mut loaded = LoadedTranscripts::default();

    for (index, path) in paths.iter().enumerate() {
        let participant = ParticipantId::from_position(index);
        match read_transcript_file(path, participant.clone()) {
            Ok(transcript) => loaded.transcripts.push(transcript),
            Err(error) => {
                warn!(%participant, path = ?path, %error, "Transcript rejected");
                loaded.rejected.push(RejectedTranscript {
                    participant,
                    path: path.clone(),
                    error,
                });
            }
        }
    }

    loaded
}
