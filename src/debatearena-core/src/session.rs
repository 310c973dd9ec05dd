//! Debate session record and its lifecycle.
//!
//! A session moves `INITIALIZED -> IN_PROGRESS <-> PAUSED -> COMPLETED`, or to
//! `ABORTED` from any non-terminal state. Transitions are methods on
//! [`Session`] and return [`DebateError::InvalidTransition`] when called from
//! the wrong state. Callers apply them through
//! [`DebateStore::update_session`](crate::store::DebateStore::update_session)
//! so the status, pause flag and checkpoint always change together.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DebateError;
use crate::participant::{Persona, Side};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Initialized,
    InProgress,
    Paused,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Initialized => "INITIALIZED",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Paused => "PAUSED",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// Pacing between debate steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Speed {
    Fast,
    #[default]
    Normal,
    Slow,
}

impl Speed {
    pub fn delay(self) -> Duration {
        match self {
            Speed::Fast => Duration::from_millis(1000),
            Speed::Normal => Duration::from_millis(3000),
            Speed::Slow => Duration::from_millis(5000),
        }
    }
}

impl FromStr for Speed {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Speed::Fast),
            "normal" => Ok(Speed::Normal),
            "slow" => Ok(Speed::Slow),
            other => Err(DebateError::ConfigError(format!("Unknown speed: {}", other))),
        }
    }
}

/// Language the debate is narrated and argued in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl FromStr for Language {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "zh" | "zh-cn" | "chinese" => Ok(Language::Zh),
            other => Err(DebateError::ConfigError(format!("Unsupported language: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    Affirmative,
    Negative,
    Draw,
}

impl Winner {
    /// Higher cumulative total wins; equal totals are a draw.
    pub fn decide(affirmative: f64, negative: f64) -> Self {
        if affirmative > negative {
            Winner::Affirmative
        } else if negative > affirmative {
            Winner::Negative
        } else {
            Winner::Draw
        }
    }

    pub fn side(self) -> Option<Side> {
        match self {
            Winner::Affirmative => Some(Side::Affirmative),
            Winner::Negative => Some(Side::Negative),
            Winner::Draw => None,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Winner::Affirmative => "AFFIRMATIVE",
            Winner::Negative => "NEGATIVE",
            Winner::Draw => "DRAW",
        };
        f.write_str(s)
    }
}

/// Who speaks next when a debate is paused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Speaker {
    Affirmative,
    Negative,
    Moderator,
}

impl From<Side> for Speaker {
    fn from(side: Side) -> Self {
        match side {
            Side::Affirmative => Speaker::Affirmative,
            Side::Negative => Speaker::Negative,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Speaker::Affirmative => "AFFIRMATIVE",
            Speaker::Negative => "NEGATIVE",
            Speaker::Moderator => "MODERATOR",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalScores {
    pub affirmative: f64,
    pub negative: f64,
    pub max_possible: f64,
}

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub topic_id: Uuid,
    pub affirmative: Persona,
    pub negative: Persona,
    pub speed: Speed,
    pub rounds: u32,
    pub language: Language,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub affirmative: Persona,
    pub negative: Persona,
    pub speed: Speed,
    pub rounds: u32,
    pub language: Language,
    pub status: SessionStatus,
    pub pause_requested: bool,
    pub checkpoint: Option<String>,
    pub final_scores: Option<FinalScores>,
    pub winner: Option<Winner>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(params: SessionParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic_id: params.topic_id,
            affirmative: params.affirmative,
            negative: params.negative,
            speed: params.speed,
            rounds: params.rounds,
            language: params.language,
            status: SessionStatus::Initialized,
            pause_requested: false,
            checkpoint: None,
            final_scores: None,
            winner: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn persona(&self, side: Side) -> &Persona {
        match side {
            Side::Affirmative => &self.affirmative,
            Side::Negative => &self.negative,
        }
    }

    /// Highest total a side can reach: 100 per round.
    pub fn max_possible(&self) -> f64 {
        100.0 * f64::from(self.rounds)
    }

    fn require(&self, action: &'static str, allowed: &[SessionStatus]) -> Result<(), DebateError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DebateError::InvalidTransition {
                action,
                status: self.status,
            })
        }
    }

    pub fn start(&mut self) -> Result<(), DebateError> {
        self.require("start", &[SessionStatus::Initialized])?;
        self.status = SessionStatus::InProgress;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Ask the running loop to stop at its next pause-check.
    pub fn request_pause(&mut self) -> Result<(), DebateError> {
        self.require("request a pause for", &[SessionStatus::InProgress])?;
        self.pause_requested = true;
        Ok(())
    }

    pub fn pause(&mut self, checkpoint: impl Into<String>) -> Result<(), DebateError> {
        self.require("pause", &[SessionStatus::InProgress])?;
        self.status = SessionStatus::Paused;
        self.pause_requested = true;
        self.checkpoint = Some(checkpoint.into());
        Ok(())
    }

    /// Clears the pause flag. The checkpoint stays until the resume path takes it.
    pub fn resume(&mut self) -> Result<(), DebateError> {
        self.require("resume", &[SessionStatus::Paused])?;
        self.status = SessionStatus::InProgress;
        self.pause_requested = false;
        Ok(())
    }

    pub fn take_checkpoint(&mut self) -> Option<String> {
        self.checkpoint.take()
    }

    /// Drop a pause request that no running loop will honor.
    pub fn clear_pause_request(&mut self) {
        if self.status != SessionStatus::Paused {
            self.pause_requested = false;
        }
    }

    pub fn complete(&mut self, scores: FinalScores, winner: Winner) -> Result<(), DebateError> {
        self.require(
            "complete",
            &[SessionStatus::InProgress, SessionStatus::Paused],
        )?;
        self.status = SessionStatus::Completed;
        self.final_scores = Some(scores);
        self.winner = Some(winner);
        self.checkpoint = None;
        self.pause_requested = false;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn abort(&mut self) -> Result<(), DebateError> {
        if self.status.is_terminal() {
            return Err(DebateError::InvalidTransition {
                action: "abort",
                status: self.status,
            });
        }
        self.status = SessionStatus::Aborted;
        self.checkpoint = None;
        self.pause_requested = false;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
