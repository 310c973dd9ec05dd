//! Events streamed to an observer while a debate runs.
//!
//! Events serialize as `{"event": "<name>", "data": {...}}`. Streamed text
//! arrives as a run of `complete: false` chunks followed by exactly one
//! `complete: true` event whose chunk is empty.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::participant::Side;
use crate::session::{Speaker, Winner};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum DebateEvent {
    DebateStart {
        session_id: Uuid,
        topic: String,
        rounds: u32,
    },
    OrganizerRules {
        chunk: String,
        complete: bool,
    },
    ModeratorIntroduction {
        chunk: String,
        complete: bool,
    },
    RoundStart {
        round: u32,
    },
    AiArgument {
        side: Side,
        chunk: String,
        complete: bool,
        round: u32,
    },
    ModeratorSummary {
        side: Side,
        chunk: String,
        complete: bool,
        round: u32,
    },
    ModeratorEvaluation {
        side: Side,
        chunk: String,
        complete: bool,
        round: u32,
    },
    RoundScoresUpdate {
        round: u32,
        affirmative_score: f64,
        negative_score: f64,
    },
    CumulativeScoresUpdate {
        affirmative_total: f64,
        negative_total: f64,
        max_possible: f64,
    },
    RoundComplete {
        round: u32,
    },
    JudgingStart,
    JudgeFeedback {
        judge_number: u8,
        chunk: String,
        complete: bool,
    },
    FinalScores {
        session_id: Uuid,
        affirmative_score: f64,
        negative_score: f64,
        max_possible: f64,
    },
    WinnerAnnouncement {
        winner: Winner,
        chunk: String,
        complete: bool,
    },
    DebateComplete {
        session_id: Uuid,
    },
    DebatePaused {
        round: u32,
        position: String,
        speaker: Speaker,
    },
    Error {
        message: String,
    },
}

impl DebateEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            DebateEvent::DebateStart { .. } => "debate_start",
            DebateEvent::OrganizerRules { .. } => "organizer_rules",
            DebateEvent::ModeratorIntroduction { .. } => "moderator_introduction",
            DebateEvent::RoundStart { .. } => "round_start",
            DebateEvent::AiArgument { .. } => "ai_argument",
            DebateEvent::ModeratorSummary { .. } => "moderator_summary",
            DebateEvent::ModeratorEvaluation { .. } => "moderator_evaluation",
            DebateEvent::RoundScoresUpdate { .. } => "round_scores_update",
            DebateEvent::CumulativeScoresUpdate { .. } => "cumulative_scores_update",
            DebateEvent::RoundComplete { .. } => "round_complete",
            DebateEvent::JudgingStart => "judging_start",
            DebateEvent::JudgeFeedback { .. } => "judge_feedback",
            DebateEvent::FinalScores { .. } => "final_scores",
            DebateEvent::WinnerAnnouncement { .. } => "winner_announcement",
            DebateEvent::DebateComplete { .. } => "debate_complete",
            DebateEvent::DebatePaused { .. } => "debate_paused",
            DebateEvent::Error { .. } => "error",
        }
    }
}

/// Which chunked event a piece of streamed text belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkKind {
    OrganizerRules,
    ModeratorIntroduction,
    AiArgument { side: Side, round: u32 },
    ModeratorSummary { side: Side, round: u32 },
    ModeratorEvaluation { side: Side, round: u32 },
    JudgeFeedback { judge_number: u8 },
    WinnerAnnouncement { winner: Winner },
}

impl ChunkKind {
    pub fn event(self, chunk: String, complete: bool) -> DebateEvent {
        match self {
            ChunkKind::OrganizerRules => DebateEvent::OrganizerRules { chunk, complete },
            ChunkKind::ModeratorIntroduction => {
                DebateEvent::ModeratorIntroduction { chunk, complete }
            }
            ChunkKind::AiArgument { side, round } => DebateEvent::AiArgument {
                side,
                chunk,
                complete,
                round,
            },
            ChunkKind::ModeratorSummary { side, round } => DebateEvent::ModeratorSummary {
                side,
                chunk,
                complete,
                round,
            },
            ChunkKind::ModeratorEvaluation { side, round } => DebateEvent::ModeratorEvaluation {
                side,
                chunk,
                complete,
                round,
            },
            ChunkKind::JudgeFeedback { judge_number } => DebateEvent::JudgeFeedback {
                judge_number,
                chunk,
                complete,
            },
            ChunkKind::WinnerAnnouncement { winner } => DebateEvent::WinnerAnnouncement {
                winner,
                chunk,
                complete,
            },
        }
    }
}

/// Ordered, per-session event channel.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<DebateEvent>,
}

impl EventEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DebateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send an event. A closed receiver is logged and otherwise ignored.
    pub fn emit(&self, event: DebateEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!(event = e.0.name(), "event receiver closed; dropping event");
        }
    }

    pub fn chunk(&self, kind: ChunkKind, chunk: impl Into<String>) {
        self.emit(kind.event(chunk.into(), false));
    }

    /// Terminal marker for a streamed step.
    pub fn finish(&self, kind: ChunkKind) {
        self.emit(kind.event(String::new(), true));
    }

    /// Emit fixed text as a single chunk plus the terminal marker.
    pub fn say(&self, kind: ChunkKind, text: impl Into<String>) {
        self.chunk(kind, text);
        self.finish(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = DebateEvent::AiArgument {
            side: Side::Affirmative,
            chunk: "AI ".to_string(),
            complete: false,
            round: 2,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "ai_argument",
                "data": {"side": "AFFIRMATIVE", "chunk": "AI ", "complete": false, "round": 2}
            })
        );
    }

    #[test]
    fn test_camel_case_fields() {
        let event = DebateEvent::CumulativeScoresUpdate {
            affirmative_total: 160.5,
            negative_total: 150.0,
            max_possible: 500.0,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "cumulative_scores_update");
        assert_eq!(value["data"]["affirmativeTotal"], 160.5);
        assert_eq!(value["data"]["maxPossible"], 500.0);
    }

    #[test]
    fn test_paused_event_names() {
        let event = DebateEvent::DebatePaused {
            round: 3,
            position: "negative_after".to_string(),
            speaker: Speaker::Moderator,
        };
        assert_eq!(event.name(), "debate_paused");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["speaker"], "MODERATOR");
    }

    #[tokio::test]
    async fn test_say_emits_chunk_then_empty_terminal() {
        let (emitter, mut rx) = EventEmitter::channel();
        emitter.say(ChunkKind::OrganizerRules, "Welcome");
        assert_eq!(
            rx.recv().await,
            Some(DebateEvent::OrganizerRules {
                chunk: "Welcome".to_string(),
                complete: false
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(DebateEvent::OrganizerRules {
                chunk: String::new(),
                complete: true
            })
        );
    }

    #[test]
    fn test_emit_after_receiver_dropped_does_not_panic() {
        let (emitter, rx) = EventEmitter::channel();
        drop(rx);
        emitter.emit(DebateEvent::JudgingStart);
    }
}
