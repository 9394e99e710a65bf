use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::paper::Paper;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// One prior message in the session, oldest first. The classifier and the
/// generation prompts both consume history in this shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Assistant, text: text.into() }
    }

    pub fn transcript_line(&self) -> String {
        match self.speaker {
            Speaker::User => format!("User: {}", self.text),
            Speaker::Assistant => format!("Assistant: {}", self.text),
        }
    }
}

/// Structured output of one handled message.
///
/// `cited_papers` is always a subset of the papers that were supplied as
/// generation input, de-duplicated by id, in order of first appearance in
/// the generated text. `html` has already passed the sanitizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub html: String,
    pub cited_papers: Vec<Paper>,
}

/// Record handed to the persistence collaborator after each reply. Delivery
/// is best-effort; the engine does not guarantee exactly-once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub user_message: String,
    pub bot_message: GenerationResult,
    pub timestamp: DateTime<Utc>,
}
