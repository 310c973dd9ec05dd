//! Debate participants: sides, roles and debater personas.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::Language;

/// The side a debater argues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// Arguing in favor of the topic.
    Affirmative,
    /// Arguing against the topic.
    Negative,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Affirmative, Side::Negative];

    pub fn opponent(self) -> Side {
        match self {
            Side::Affirmative => Side::Negative,
            Side::Negative => Side::Affirmative,
        }
    }

    /// Lowercase form used inside checkpoint strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Affirmative => "affirmative",
            Side::Negative => "negative",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Side::Affirmative => "AFFIRMATIVE",
            Side::Negative => "NEGATIVE",
        }
    }

    /// Human label in the debate language.
    pub fn label(self, language: Language) -> &'static str {
        match (self, language) {
            (Side::Affirmative, Language::En) => "Affirmative",
            (Side::Negative, Language::En) => "Negative",
            (Side::Affirmative, Language::Zh) => "正方",
            (Side::Negative, Language::Zh) => "反方",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of role a participant plays in a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleKind {
    Organizer,
    Moderator,
    /// Judge number, starting at 1.
    Judge(u8),
    Affirmative,
    Negative,
}

impl RoleKind {
    pub fn display_name(&self) -> String {
        match self {
            RoleKind::Organizer => "ORGANIZER".to_string(),
            RoleKind::Moderator => "MODERATOR".to_string(),
            RoleKind::Judge(n) => format!("JUDGE_{}", n),
            RoleKind::Affirmative => "AFFIRMATIVE".to_string(),
            RoleKind::Negative => "NEGATIVE".to_string(),
        }
    }

    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Affirmative => RoleKind::Affirmative,
            Side::Negative => RoleKind::Negative,
        }
    }
}

/// Personality and expertise a debater is generated with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Persona {
    /// e.g. "Analytical", "Passionate".
    pub personality: String,
    /// e.g. "Expert", "Intermediate".
    pub expertise_level: String,
    /// Model override for this debater; the configured default is used when absent.
    #[serde(default)]
    pub model: Option<String>,
}

impl Persona {
    pub fn new(personality: impl Into<String>, expertise_level: impl Into<String>) -> Self {
        Self {
            personality: personality.into(),
            expertise_level: expertise_level.into(),
            model: None,
        }
    }

    /// Use a specific model for this debater.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A participant role bound to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: RoleKind,
    /// Set for debater roles only.
    pub persona: Option<Persona>,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(session_id: Uuid, kind: RoleKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            kind,
            persona: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    /// Judge number when this is a judge role.
    pub fn judge_number(&self) -> Option<u8> {
        match self.kind {
            RoleKind::Judge(n) => Some(n),
            _ => None,
        }
    }
}
