//! DebateArena Core Library
//!
//! Runs multi-round debates between two generated debaters: the round
//! orchestration, pause/resume checkpoints, judge scoring and the event
//! stream an observer follows along with.

pub mod argument_scoring;
pub mod checkpoint;
pub mod config;
pub mod debate_format;
pub mod debater;
pub mod error;
pub mod events;
pub mod judge;
pub mod llm;
pub mod mock;
pub mod moderation;
pub mod moderator;
pub mod orchestrator;
pub mod participant;
pub mod records;
pub mod resume;
pub mod scoring;
pub mod service;
pub mod session;
pub mod store;

pub use checkpoint::{Checkpoint, RoundStep};
pub use config::Config;
pub use debate_format::{DebateFormat, RoundPlan};
pub use error::DebateError;
pub use events::{DebateEvent, EventEmitter};
pub use llm::{OpenAiGenerator, TextGenerator};
pub use mock::MockGenerator;
pub use orchestrator::{FinalResult, Orchestrator, RunOutcome};
pub use participant::{Persona, Role, RoleKind, Side};
pub use service::{DebateService, SessionRequest, StreamOutcome};
pub use session::{Language, Session, SessionStatus, Speed, Winner};
pub use store::{DebateStore, MemoryStore};
