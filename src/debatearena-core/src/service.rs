//! Command surface for driving debates.
//!
//! `DebateService` ties the store, the generator and the configuration
//! together and guarantees at most one orchestration loop per session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::argument_scoring::{ArgumentBreakdown, ArgumentScorer, ScoreRecord, create_scoring_rules};
use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::error::DebateError;
use crate::events::{DebateEvent, EventEmitter};
use crate::llm::TextGenerator;
use crate::moderation::ContentModerator;
use crate::orchestrator::{FinalResult, Orchestrator, RunOutcome};
use crate::participant::{Persona, Role, RoleKind};
use crate::records::{Argument, ModeratorMessage, Topic};
use crate::resume::ResumeCoordinator;
use crate::scoring::{CumulativeScores, RoundBreakdown};
use crate::session::{Language, Session, SessionParams, SessionStatus, Speed};
use crate::store::DebateStore;

/// Options for a new session. Unset fields take the configured defaults.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub topic_id: Uuid,
    pub rounds: Option<u32>,
    pub speed: Option<Speed>,
    pub language: Option<Language>,
    pub affirmative: Option<Persona>,
    pub negative: Option<Persona>,
}

impl SessionRequest {
    pub fn new(topic_id: Uuid) -> Self {
        Self {
            topic_id,
            rounds: None,
            speed: None,
            language: None,
            affirmative: None,
            negative: None,
        }
    }

    pub fn rounds(mut self, rounds: u32) -> Self {
        self.rounds = Some(rounds);
        self
    }

    pub fn speed(mut self, speed: Speed) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }
}

/// How a call to [`DebateService::stream`] ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamOutcome {
    Completed(FinalResult),
    Paused,
    Failed,
}

type ActiveSet = Arc<Mutex<HashSet<Uuid>>>;

/// Marks a session as having a running loop until dropped.
struct ActiveGuard {
    active: ActiveSet,
    session_id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session_id);
    }
}

pub struct DebateService {
    config: Arc<Config>,
    store: Arc<dyn DebateStore>,
    orchestrator: Orchestrator,
    arguments: ArgumentScorer,
    moderator: ContentModerator,
    active: ActiveSet,
}

impl DebateService {
    pub fn new(
        config: Config,
        store: Arc<dyn DebateStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            orchestrator: Orchestrator::new(
                Arc::clone(&store),
                Arc::clone(&generator),
                Arc::clone(&config),
            ),
            arguments: ArgumentScorer::new(Arc::clone(&store), generator, &config),
            moderator: ContentModerator::new(config.moderation.banned_terms.clone()),
            active: Arc::new(Mutex::new(HashSet::new())),
            store,
            config,
        }
    }

    /// Enable or disable the delays between debate steps.
    pub fn with_pacing(mut self, pacing: bool) -> Self {
        self.orchestrator = self.orchestrator.with_pacing(pacing);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn claim(&self, session_id: Uuid) -> Option<ActiveGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.insert(session_id).then(|| ActiveGuard {
            active: Arc::clone(&self.active),
            session_id,
        })
    }

    pub fn is_active(&self, session_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&session_id)
    }

    pub async fn create_topic(
        &self,
        title: &str,
        description: &str,
    ) -> Result<Topic, DebateError> {
        for text in [title, description] {
            let result = self.moderator.validate(text);
            if !result.valid {
                warn!(terms = ?result.violated_terms, severity = ?result.max_severity, "topic rejected by moderation");
                return Err(DebateError::ContentRejected(result.violated_terms.join(", ")));
            }
        }

        let topic = Topic::new(title.trim(), description.trim());
        self.store.insert_topic(topic.clone()).await?;
        Ok(topic)
    }

    /// Create an `INITIALIZED` session with its roles and scoring rules.
    pub async fn create_session(&self, request: SessionRequest) -> Result<Session, DebateError> {
        if self.store.topic(request.topic_id).await?.is_none() {
            return Err(DebateError::TopicNotFound(request.topic_id));
        }
        let rounds = request.rounds.unwrap_or(self.config.debate.rounds);
        if rounds == 0 {
            return Err(DebateError::InvalidRoundCount);
        }

        let personas = &self.config.personas;
        let session = Session::new(SessionParams {
            topic_id: request.topic_id,
            affirmative: request
                .affirmative
                .unwrap_or_else(|| personas.affirmative.clone()),
            negative: request
                .negative
                .unwrap_or_else(|| personas.negative.clone()),
            speed: request.speed.unwrap_or(self.config.debate.speed),
            rounds,
            language: request.language.unwrap_or(self.config.debate.language),
        });

        let mut roles = vec![
            Role::new(session.id, RoleKind::Organizer),
            Role::new(session.id, RoleKind::Moderator),
        ];
        roles.extend((1..=self.config.debate.judges).map(|n| Role::new(session.id, RoleKind::Judge(n))));
        roles.push(Role::new(session.id, RoleKind::Affirmative).with_persona(session.affirmative.clone()));
        roles.push(Role::new(session.id, RoleKind::Negative).with_persona(session.negative.clone()));

        self.store.insert_session(session.clone()).await?;
        self.store.insert_roles(roles).await?;
        self.store
            .insert_scoring_rules(create_scoring_rules(session.id))
            .await?;

        info!(session_id = %session.id, rounds, "session created");
        Ok(session)
    }

    pub async fn start(&self, session_id: Uuid) -> Result<Session, DebateError> {
        self.store
            .update_session(session_id, Box::new(|s: &mut Session| s.start()))
            .await
    }

    /// Drive the session from its current state, emitting events until it
    /// completes, pauses or fails.
    pub async fn stream(&self, session_id: Uuid, emitter: EventEmitter) -> StreamOutcome {
        let Some(_guard) = self.claim(session_id) else {
            let err = DebateError::SessionBusy(session_id);
            warn!(%session_id, "stream rejected: loop already running");
            emitter.emit(DebateEvent::Error {
                message: err.to_string(),
            });
            return StreamOutcome::Failed;
        };

        match self.drive(session_id, emitter.clone()).await {
            Ok(RunOutcome::Completed(result)) => StreamOutcome::Completed(result),
            Ok(RunOutcome::Paused) => StreamOutcome::Paused,
            Err(e) => {
                error!(%session_id, error = %e, "debate stream failed");
                // Any pending pause request died with the loop.
                if let Err(clear) = self
                    .store
                    .update_session(
                        session_id,
                        Box::new(|s: &mut Session| {
                            s.clear_pause_request();
                            Ok(())
                        }),
                    )
                    .await
                {
                    warn!(%session_id, error = %clear, "could not clear pause request");
                }
                emitter.emit(DebateEvent::Error {
                    message: e.to_string(),
                });
                StreamOutcome::Failed
            }
        }
    }

    async fn drive(&self, session_id: Uuid, emitter: EventEmitter) -> Result<RunOutcome, DebateError> {
        let session = self.session(session_id).await?;
        match session.status {
            SessionStatus::Paused => {
                ResumeCoordinator::new(&self.orchestrator)
                    .resume(session_id, emitter)
                    .await
            }
            SessionStatus::InProgress if session.checkpoint.is_some() => {
                ResumeCoordinator::new(&self.orchestrator)
                    .resume(session_id, emitter)
                    .await
            }
            SessionStatus::Initialized => {
                self.start(session_id).await?;
                let ctx = self.orchestrator.context(session_id, emitter).await?;
                self.orchestrator.run(&ctx).await
            }
            SessionStatus::InProgress => {
                self.store
                    .update_session(
                        session_id,
                        Box::new(|s: &mut Session| {
                            s.clear_pause_request();
                            Ok(())
                        }),
                    )
                    .await?;
                let ctx = self.orchestrator.context(session_id, emitter).await?;
                self.orchestrator.run(&ctx).await
            }
            status @ (SessionStatus::Completed | SessionStatus::Aborted) => {
                Err(DebateError::InvalidTransition {
                    action: "stream",
                    status,
                })
            }
        }
    }

    /// Run [`stream`](Self::stream) on a background task.
    pub fn spawn_stream(
        self: &Arc<Self>,
        session_id: Uuid,
    ) -> (JoinHandle<StreamOutcome>, mpsc::UnboundedReceiver<DebateEvent>) {
        let (emitter, rx) = EventEmitter::channel();
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move { service.stream(session_id, emitter).await });
        (handle, rx)
    }

    /// Request a pause. A running loop stops at its next pause-check; a
    /// session without one keeps any checkpoint it still holds, or is
    /// paused at the start of its current round.
    pub async fn pause(&self, session_id: Uuid) -> Result<Session, DebateError> {
        if self.is_active(session_id) {
            info!(%session_id, "pause requested");
            return self
                .store
                .update_session(session_id, Box::new(|s: &mut Session| s.request_pause()))
                .await;
        }

        let session = self.session(session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(DebateError::InvalidTransition {
                action: "pause",
                status: session.status,
            });
        }
        // A checkpoint kept by `resume` has not been consumed yet.
        let checkpoint = match session.checkpoint {
            Some(kept) => kept,
            None => {
                let current = self
                    .store
                    .arguments(session_id)
                    .await?
                    .iter()
                    .map(|a| a.round)
                    .max()
                    .unwrap_or(1);
                Checkpoint::Round(current).to_string()
            }
        };
        info!(%session_id, %checkpoint, "session paused without a running loop");
        self.store
            .update_session(
                session_id,
                Box::new(move |s: &mut Session| s.pause(checkpoint)),
            )
            .await
    }

    /// Move a paused session back to `IN_PROGRESS`, keeping its checkpoint.
    pub async fn resume(&self, session_id: Uuid) -> Result<Session, DebateError> {
        self.store
            .update_session(session_id, Box::new(|s: &mut Session| s.resume()))
            .await
    }

    /// Finish the debate immediately from the rounds scored so far.
    pub async fn skip_to_end(&self, session_id: Uuid) -> Result<FinalResult, DebateError> {
        if self.is_active(session_id) {
            return Err(DebateError::SessionBusy(session_id));
        }
        let session = self.session(session_id).await?;
        if !matches!(
            session.status,
            SessionStatus::InProgress | SessionStatus::Paused
        ) {
            return Err(DebateError::InvalidTransition {
                action: "skip",
                status: session.status,
            });
        }

        let result = self.orchestrator.final_result(&session).await?;
        let FinalResult { scores, winner } = result;
        self.store
            .update_session(
                session_id,
                Box::new(move |s: &mut Session| s.complete(scores, winner)),
            )
            .await?;
        info!(%session_id, %winner, "debate skipped to end");
        Ok(result)
    }

    pub async fn abort(&self, session_id: Uuid) -> Result<Session, DebateError> {
        self.store
            .update_session(session_id, Box::new(|s: &mut Session| s.abort()))
            .await
    }

    pub async fn session(&self, session_id: Uuid) -> Result<Session, DebateError> {
        self.orchestrator.load_session(session_id).await
    }

    /// Most recently created session, if any.
    pub async fn latest_session(&self) -> Result<Option<Session>, DebateError> {
        Ok(self
            .store
            .sessions()
            .await?
            .into_iter()
            .max_by_key(|s| s.created_at))
    }

    pub async fn arguments(&self, session_id: Uuid) -> Result<Vec<Argument>, DebateError> {
        self.store.arguments(session_id).await
    }

    pub async fn moderator_messages(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ModeratorMessage>, DebateError> {
        self.store.moderator_messages(session_id).await
    }

    pub async fn cumulative_scores(&self, session_id: Uuid) -> Result<CumulativeScores, DebateError> {
        let session = self.session(session_id).await?;
        self.orchestrator.scoring().cumulative_scores(&session).await
    }

    pub async fn round_breakdown(
        &self,
        session_id: Uuid,
        round: u32,
    ) -> Result<RoundBreakdown, DebateError> {
        self.orchestrator
            .scoring()
            .round_breakdown(session_id, round)
            .await
    }

    /// Weighted per-criterion judging of a single argument.
    pub async fn score_argument(&self, argument_id: Uuid) -> Result<Vec<ScoreRecord>, DebateError> {
        let argument = self.argument(argument_id).await?;
        let session = self.session(argument.session_id).await?;
        let topic = self
            .store
            .topic(session.topic_id)
            .await?
            .ok_or(DebateError::TopicNotFound(session.topic_id))?;
        let judges = self.store.roles(session.id).await?;
        self.arguments
            .score_argument(&argument, &topic.title, &judges)
            .await
    }

    pub async fn argument_breakdown(&self, argument_id: Uuid) -> Result<ArgumentBreakdown, DebateError> {
        let argument = self.argument(argument_id).await?;
        self.arguments.breakdown(&argument).await
    }

    async fn argument(&self, argument_id: Uuid) -> Result<Argument, DebateError> {
        self.store
            .argument(argument_id)
            .await?
            .ok_or(DebateError::ArgumentNotFound(argument_id))
    }
}
