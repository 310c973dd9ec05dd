//! Debate orchestration logic.
//!
//! Runs the opening, every round's fixed sequence of sub-steps, and the
//! final judging, streaming events as it goes. Before each argument and each
//! moderator feedback step the loop checks the session's pause flag; when it
//! is set the loop persists a checkpoint naming that step, emits
//! `debate_paused` and returns.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, RoundStep};
use crate::config::Config;
use crate::debate_format::{DebateFormat, RoundPlan, get_format};
use crate::debater::{ArgumentRequest, Debater};
use crate::error::DebateError;
use crate::events::{ChunkKind, DebateEvent, EventEmitter};
use crate::llm::TextGenerator;
use crate::moderator::{self, Moderator};
use crate::participant::{Persona, Role, RoleKind, Side};
use crate::records::{Argument, MessageKind, ModeratorMessage};
use crate::scoring::{ScoringEngine, latest_argument};
use crate::session::{FinalScores, Language, Session, Speed, Winner};
use crate::store::DebateStore;

/// How a single round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Completed,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalResult {
    pub scores: FinalScores,
    pub winner: Winner,
}

/// How a debate run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
    Completed(FinalResult),
    Paused,
}

/// Per-run view of a session: everything that stays fixed while it streams.
pub struct DebateContext {
    pub session_id: Uuid,
    pub topic: String,
    pub rounds: u32,
    pub language: Language,
    pub speed: Speed,
    pub affirmative: Persona,
    pub negative: Persona,
    pub roles: Vec<Role>,
    pub format: Box<dyn DebateFormat>,
    pub emitter: EventEmitter,
}

impl DebateContext {
    fn persona(&self, side: Side) -> &Persona {
        match side {
            Side::Affirmative => &self.affirmative,
            Side::Negative => &self.negative,
        }
    }

    fn role_id(&self, kind: RoleKind) -> Result<Uuid, DebateError> {
        self.roles
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.id)
            .ok_or_else(|| {
                DebateError::Store(format!(
                    "session {} has no {} role",
                    self.session_id,
                    kind.display_name()
                ))
            })
    }

    fn judge_numbers(&self) -> Vec<u8> {
        let mut judges: Vec<u8> = self.roles.iter().filter_map(Role::judge_number).collect();
        judges.sort_unstable();
        judges
    }
}

/// Orchestrates debates between the two AI debaters.
pub struct Orchestrator {
    store: Arc<dyn DebateStore>,
    config: Arc<Config>,
    debater: Debater,
    moderator: Moderator,
    scoring: ScoringEngine,
    pacing: bool,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DebateStore>,
        generator: Arc<dyn TextGenerator>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            debater: Debater::new(Arc::clone(&generator), Arc::clone(&config)),
            moderator: Moderator::new(Arc::clone(&generator), &config),
            scoring: ScoringEngine::new(Arc::clone(&store), generator, &config),
            store,
            config,
            pacing: true,
        }
    }

    /// Enable or disable the delays between steps.
    pub fn with_pacing(mut self, pacing: bool) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn store(&self) -> &Arc<dyn DebateStore> {
        &self.store
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    pub(crate) async fn load_session(&self, session_id: Uuid) -> Result<Session, DebateError> {
        self.store
            .session(session_id)
            .await?
            .ok_or(DebateError::SessionNotFound(session_id))
    }

    /// Gather what a run needs from the store.
    pub async fn context(
        &self,
        session_id: Uuid,
        emitter: EventEmitter,
    ) -> Result<DebateContext, DebateError> {
        let session = self.load_session(session_id).await?;
        let topic = self
            .store
            .topic(session.topic_id)
            .await?
            .ok_or(DebateError::TopicNotFound(session.topic_id))?;
        let roles = self.store.roles(session_id).await?;
        let format = get_format(&self.config.debate.format, session.rounds)
            .ok_or_else(|| DebateError::UnknownFormat(self.config.debate.format.clone()))?;

        Ok(DebateContext {
            session_id,
            topic: topic.title,
            rounds: session.rounds,
            language: session.language,
            speed: session.speed,
            affirmative: session.affirmative,
            negative: session.negative,
            roles,
            format,
            emitter,
        })
    }

    /// Full run: opening, every round, judging.
    pub async fn run(&self, ctx: &DebateContext) -> Result<RunOutcome, DebateError> {
        info!(session_id = %ctx.session_id, rounds = ctx.rounds, "debate started");
        self.opening(ctx).await;
        self.run_from(ctx, 1, RoundStep::AffirmativeArgument).await
    }

    /// Enter `round` at `entry`, then play the remaining rounds and the judging.
    pub async fn run_from(
        &self,
        ctx: &DebateContext,
        round: u32,
        entry: RoundStep,
    ) -> Result<RunOutcome, DebateError> {
        for current in round..=ctx.rounds {
            let step = if current == round {
                entry
            } else {
                RoundStep::AffirmativeArgument
            };
            if self.run_round(ctx, current, step).await? == RoundOutcome::Paused {
                return Ok(RunOutcome::Paused);
            }
        }

        self.judging(ctx).await.map(RunOutcome::Completed)
    }

    async fn opening(&self, ctx: &DebateContext) {
        ctx.emitter.emit(DebateEvent::DebateStart {
            session_id: ctx.session_id,
            topic: ctx.topic.clone(),
            rounds: ctx.rounds,
        });
        ctx.emitter.say(
            ChunkKind::OrganizerRules,
            moderator::organizer_rules(ctx.language, ctx.rounds),
        );
        ctx.emitter.say(
            ChunkKind::ModeratorIntroduction,
            moderator::introduction(ctx.language, &ctx.topic),
        );
        self.pace(ctx.speed.delay()).await;
    }

    /// Run one round from `entry` onwards.
    pub async fn run_round(
        &self,
        ctx: &DebateContext,
        round: u32,
        entry: RoundStep,
    ) -> Result<RoundOutcome, DebateError> {
        ctx.emitter.emit(DebateEvent::RoundStart { round });
        let plan = ctx.format.round_plan(round, ctx.language);
        let delay = ctx.speed.delay();
        let mut affirmative: Option<Argument> = None;
        let mut negative: Option<Argument> = None;

        for step in RoundStep::from_entry(entry) {
            if let Some(checkpoint) = step.checkpoint(round)
                && self.pause_if_requested(ctx, checkpoint).await?
            {
                return Ok(RoundOutcome::Paused);
            }

            match step {
                RoundStep::AffirmativeArgument => {
                    affirmative = Some(self.argument_step(ctx, &plan, Side::Affirmative).await?);
                    self.pace(delay / 2).await;
                }
                RoundStep::AffirmativeFeedback => {
                    let argument = self.resolve(ctx, round, Side::Affirmative, affirmative.take()).await?;
                    self.feedback_step(ctx, &argument).await?;
                    self.pace(delay).await;
                }
                RoundStep::NegativeArgument => {
                    negative = Some(self.argument_step(ctx, &plan, Side::Negative).await?);
                    self.pace(delay / 2).await;
                }
                RoundStep::NegativeFeedback => {
                    let argument = self.resolve(ctx, round, Side::Negative, negative.take()).await?;
                    self.feedback_step(ctx, &argument).await?;
                }
                RoundStep::Scoring => {
                    self.scoring_step(ctx, &plan).await?;
                    self.pace(delay).await;
                }
            }
        }

        Ok(RoundOutcome::Completed)
    }

    /// Honor a pending pause request at `checkpoint`.
    async fn pause_if_requested(
        &self,
        ctx: &DebateContext,
        checkpoint: Checkpoint,
    ) -> Result<bool, DebateError> {
        let session = self.load_session(ctx.session_id).await?;
        if session.status.is_terminal() {
            return Err(DebateError::InvalidTransition {
                action: "continue",
                status: session.status,
            });
        }
        if !session.pause_requested {
            return Ok(false);
        }

        let stored = checkpoint.to_string();
        self.store
            .update_session(
                ctx.session_id,
                Box::new(move |s: &mut Session| s.pause(stored)),
            )
            .await?;

        info!(session_id = %ctx.session_id, %checkpoint, "debate paused");
        ctx.emitter.emit(DebateEvent::DebatePaused {
            round: checkpoint.round(),
            position: checkpoint.position(),
            speaker: checkpoint.pending_speaker(),
        });
        Ok(true)
    }

    async fn argument_step(
        &self,
        ctx: &DebateContext,
        plan: &RoundPlan,
        side: Side,
    ) -> Result<Argument, DebateError> {
        let round = plan.number;
        let history = self.store.arguments(ctx.session_id).await?;
        let request = ArgumentRequest {
            topic: &ctx.topic,
            side,
            rounds: ctx.rounds,
            persona: ctx.persona(side),
            history: &history,
            plan,
            language: ctx.language,
            instruction: None,
        };

        let kind = ChunkKind::AiArgument { side, round };
        let emitter = &ctx.emitter;
        let text = self
            .debater
            .argue(&request, &mut |chunk: &str| emitter.chunk(kind, chunk))
            .await;

        let argument = Argument::new(
            ctx.session_id,
            ctx.role_id(RoleKind::for_side(side))?,
            side,
            round,
            text,
        );
        self.store.insert_argument(argument.clone()).await?;
        emitter.finish(kind);
        debug!(session_id = %ctx.session_id, round, %side, chars = argument.character_count, "argument stored");
        Ok(argument)
    }

    /// Argument generated earlier in this run, or the latest stored one when resuming.
    async fn resolve(
        &self,
        ctx: &DebateContext,
        round: u32,
        side: Side,
        produced: Option<Argument>,
    ) -> Result<Argument, DebateError> {
        if let Some(argument) = produced {
            return Ok(argument);
        }
        let arguments = self.store.arguments(ctx.session_id).await?;
        latest_argument(&arguments, round, side)
            .cloned()
            .ok_or(DebateError::MissingArgument { round, side })
    }

    async fn feedback_step(&self, ctx: &DebateContext, argument: &Argument) -> Result<(), DebateError> {
        let side = argument.side;
        let round = argument.round;
        let emitter = &ctx.emitter;

        let kind = ChunkKind::ModeratorSummary { side, round };
        let summary = self
            .moderator
            .summarize(&ctx.topic, argument, ctx.language, &mut |chunk: &str| {
                emitter.chunk(kind, chunk)
            })
            .await;
        self.store
            .insert_moderator_message(ModeratorMessage::new(argument, MessageKind::Summary, summary))
            .await?;
        emitter.finish(kind);

        let arguments = self.store.arguments(ctx.session_id).await?;
        let position = arguments
            .iter()
            .position(|a| a.id == argument.id)
            .unwrap_or(arguments.len());
        let kind = ChunkKind::ModeratorEvaluation { side, round };
        let evaluation = self
            .moderator
            .evaluate(
                &ctx.topic,
                argument,
                &arguments[..position],
                ctx.language,
                &mut |chunk: &str| emitter.chunk(kind, chunk),
            )
            .await;
        self.store
            .insert_moderator_message(ModeratorMessage::new(
                argument,
                MessageKind::Evaluation,
                evaluation,
            ))
            .await?;
        emitter.finish(kind);
        Ok(())
    }

    async fn scoring_step(&self, ctx: &DebateContext, plan: &RoundPlan) -> Result<(), DebateError> {
        let session = self.load_session(ctx.session_id).await?;
        let scores = self
            .scoring
            .score_round(&session, &ctx.topic, plan, &ctx.roles)
            .await?;
        ctx.emitter.emit(DebateEvent::RoundScoresUpdate {
            round: scores.round,
            affirmative_score: scores.affirmative,
            negative_score: scores.negative,
        });

        let totals = self.scoring.cumulative_scores(&session).await?;
        ctx.emitter.emit(DebateEvent::CumulativeScoresUpdate {
            affirmative_total: totals.affirmative_total,
            negative_total: totals.negative_total,
            max_possible: totals.max_possible,
        });
        ctx.emitter.emit(DebateEvent::RoundComplete { round: plan.number });
        Ok(())
    }

    /// Totals and winner from the scored rounds.
    pub async fn final_result(&self, session: &Session) -> Result<FinalResult, DebateError> {
        let totals = self.scoring.cumulative_scores(session).await?;
        Ok(FinalResult {
            scores: FinalScores {
                affirmative: totals.affirmative_total,
                negative: totals.negative_total,
                max_possible: totals.max_possible,
            },
            winner: Winner::decide(totals.affirmative_total, totals.negative_total),
        })
    }

    async fn judging(&self, ctx: &DebateContext) -> Result<FinalResult, DebateError> {
        ctx.emitter.emit(DebateEvent::JudgingStart);

        let session = self.load_session(ctx.session_id).await?;
        let result = self.final_result(&session).await?;

        for judge in ctx.judge_numbers() {
            ctx.emitter.say(
                ChunkKind::JudgeFeedback {
                    judge_number: judge,
                },
                moderator::judge_commentary(ctx.language, judge),
            );
        }

        ctx.emitter.emit(DebateEvent::FinalScores {
            session_id: ctx.session_id,
            affirmative_score: result.scores.affirmative,
            negative_score: result.scores.negative,
            max_possible: result.scores.max_possible,
        });
        ctx.emitter.say(
            ChunkKind::WinnerAnnouncement {
                winner: result.winner,
            },
            moderator::winner_announcement(ctx.language, result.winner),
        );

        let FinalResult { scores, winner } = result;
        self.store
            .update_session(
                ctx.session_id,
                Box::new(move |s: &mut Session| s.complete(scores, winner)),
            )
            .await?;

        info!(
            session_id = %ctx.session_id,
            affirmative = scores.affirmative,
            negative = scores.negative,
            %winner,
            "debate completed"
        );
        ctx.emitter.emit(DebateEvent::DebateComplete {
            session_id: ctx.session_id,
        });
        Ok(result)
    }

    async fn pace(&self, delay: Duration) {
        if self.pacing && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
