//! Error types for the debate arena.

use thiserror::Error;
use uuid::Uuid;

use crate::participant::Side;
use crate::session::SessionStatus;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Topic not found: {0}")]
    TopicNotFound(Uuid),

    #[error("Argument not found: {0}")]
    ArgumentNotFound(Uuid),

    #[error("Cannot {action} a session that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    #[error("Checkpoint round {round} is outside 1..={rounds}")]
    CheckpointOutOfRange { round: u32, rounds: u32 },

    #[error("No {side} argument recorded for round {round}")]
    MissingArgument { round: u32, side: Side },

    #[error("Session {0} already has a running debate loop")]
    SessionBusy(Uuid),

    #[error("A debate needs at least one round")]
    InvalidRoundCount,

    #[error("Topic rejected by content moderation: {0}")]
    ContentRejected(String),

    #[error("Malformed judgment: {0}")]
    MalformedJudgment(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown debate format: {0}")]
    UnknownFormat(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
