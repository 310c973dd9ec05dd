//! Persisted debate facts: topics, arguments and moderator messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::participant::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Topic {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// One debater's argument for one round. Never modified once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role_id: Uuid,
    pub side: Side,
    pub round: u32,
    pub text: String,
    pub character_count: usize,
    pub submitted_at: DateTime<Utc>,
}

impl Argument {
    pub fn new(session_id: Uuid, role_id: Uuid, side: Side, round: u32, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role_id,
            side,
            round,
            character_count: text.chars().count(),
            text,
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Summary,
    Evaluation,
}

/// Moderator commentary about a specific argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub argument_id: Uuid,
    pub round: u32,
    pub kind: MessageKind,
    pub content: String,
    pub speaker_side: Side,
    pub created_at: DateTime<Utc>,
}

impl ModeratorMessage {
    pub fn new(argument: &Argument, kind: MessageKind, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: argument.session_id,
            argument_id: argument.id,
            round: argument.round,
            kind,
            content,
            speaker_side: argument.side,
            created_at: Utc::now(),
        }
    }
}
