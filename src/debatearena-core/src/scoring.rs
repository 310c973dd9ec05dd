//! Per-round judging.
//!
//! After both sides have argued, every judge scores both arguments
//! concurrently. Each evaluation is isolated: a judge that errors, times
//! out, answers garbage or panics gets the default score instead, and the
//! other evaluations carry on. The round always ends with one record per
//! judge and side.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::debate_format::RoundPlan;
use crate::error::DebateError;
use crate::judge::{Judgment, parse_judgment, previous_rounds_context, round_judgment_prompt};
use crate::llm::{Prompt, RetryPolicy, TextGenerator};
use crate::participant::{Role, Side};
use crate::records::Argument;
use crate::session::Session;
use crate::store::DebateStore;

pub const DEFAULT_ROUND_SCORE: f64 = 75.0;
pub const DEFAULT_ROUND_FEEDBACK: &str = "Evaluation error, default score applied";

/// Round to two decimals, halves away from zero.
pub fn round_half_up(value: f64) -> f64 {
    // Nudge past binary representation error so 2.675 rounds to 2.68.
    ((value * 100.0) + 1e-7).round() / 100.0
}

/// One judge's score for one side in one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundScoreRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub round: u32,
    pub judge: u8,
    pub judge_role_id: Uuid,
    pub side: Side,
    pub score: f64,
    pub feedback: String,
    pub scored_at: DateTime<Utc>,
}

/// Judge averages for a round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundScores {
    pub round: u32,
    pub affirmative: f64,
    pub negative: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CumulativeScores {
    pub affirmative_total: f64,
    pub negative_total: f64,
    pub max_possible: f64,
    pub rounds_scored: u32,
}

#[derive(Debug, Clone)]
pub struct RoundBreakdown {
    pub round: u32,
    pub affirmative: Vec<RoundScoreRecord>,
    pub negative: Vec<RoundScoreRecord>,
    pub affirmative_average: f64,
    pub negative_average: f64,
}

/// Latest record per (round, judge, side), ordered by round, judge, side.
fn latest_records(records: Vec<RoundScoreRecord>) -> Vec<RoundScoreRecord> {
    let mut latest: BTreeMap<(u32, u8, Side), RoundScoreRecord> = BTreeMap::new();
    for record in records {
        latest.insert((record.round, record.judge, record.side), record);
    }
    latest.into_values().collect()
}

fn side_average<'a>(records: impl Iterator<Item = &'a RoundScoreRecord>) -> f64 {
    let (sum, count) = records.fold((0.0, 0u32), |(sum, count), r| (sum + r.score, count + 1));
    if count == 0 {
        0.0
    } else {
        round_half_up(sum / f64::from(count))
    }
}

fn averages(round: u32, records: &[RoundScoreRecord]) -> RoundScores {
    let of = |side: Side| side_average(records.iter().filter(|r| r.round == round && r.side == side));
    RoundScores {
        round,
        affirmative: of(Side::Affirmative),
        negative: of(Side::Negative),
    }
}

/// Latest stored argument for a side in a round.
pub fn latest_argument(arguments: &[Argument], round: u32, side: Side) -> Option<&Argument> {
    arguments
        .iter()
        .rev()
        .find(|a| a.round == round && a.side == side)
}

pub struct ScoringEngine {
    store: Arc<dyn DebateStore>,
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    judge_timeout: Duration,
    max_parallel: usize,
    max_tokens: u32,
    model: String,
}

impl ScoringEngine {
    pub fn new(
        store: Arc<dyn DebateStore>,
        generator: Arc<dyn TextGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            generator,
            policy: RetryPolicy::from_config(&config.generation)
                .with_attempts(config.scoring.judge_attempts),
            judge_timeout: Duration::from_secs(config.scoring.judge_timeout_secs),
            max_parallel: config.scoring.max_parallel_evaluations.max(1),
            max_tokens: config.generation.judgment_max_tokens,
            model: config.judge_model().to_string(),
        }
    }

    /// Score round `plan.number` with every judge role of the session.
    pub async fn score_round(
        &self,
        session: &Session,
        topic: &str,
        plan: &RoundPlan,
        judges: &[Role],
    ) -> Result<RoundScores, DebateError> {
        let round = plan.number;
        let mut panel: Vec<(u8, Uuid)> = judges
            .iter()
            .filter_map(|r| r.judge_number().map(|n| (n, r.id)))
            .collect();
        panel.sort_unstable();
        if panel.is_empty() {
            return Err(DebateError::ConfigError(format!(
                "session {} has no judges",
                session.id
            )));
        }

        let arguments = self.store.arguments(session.id).await?;
        let argument_for = |side: Side| {
            latest_argument(&arguments, round, side)
                .cloned()
                .ok_or(DebateError::MissingArgument { round, side })
        };
        let affirmative = argument_for(Side::Affirmative)?;
        let negative = argument_for(Side::Negative)?;
        let context = previous_rounds_context(&arguments, round, session.language);

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks: JoinSet<(u8, Side, Result<Judgment, DebateError>)> = JoinSet::new();

        for &(judge, _) in &panel {
            for side in Side::BOTH {
                let (argument, opponent) = match side {
                    Side::Affirmative => (&affirmative, &negative),
                    Side::Negative => (&negative, &affirmative),
                };
                let prompt = round_judgment_prompt(
                    judge,
                    side,
                    topic,
                    plan,
                    argument,
                    opponent,
                    &context,
                    session.language,
                )
                .with_max_tokens(self.max_tokens)
                .with_model(Some(self.model.clone()));

                let generator = Arc::clone(&self.generator);
                let semaphore = Arc::clone(&semaphore);
                let policy = self.policy;
                let limit = self.judge_timeout;

                tasks.spawn(async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            tokio::time::timeout(limit, evaluate(generator.as_ref(), &prompt, &policy))
                                .await
                                .unwrap_or(Err(DebateError::Timeout))
                        }
                        Err(_) => Err(DebateError::Generation(
                            "scoring semaphore closed".to_string(),
                        )),
                    };
                    (judge, side, result)
                });
            }
        }

        let mut judgments: HashMap<(u8, Side), Judgment> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((judge, side, Ok(judgment))) => {
                    debug!(session_id = %session.id, round, judge, %side, score = judgment.score, "judgment received");
                    judgments.insert((judge, side), judgment);
                }
                Ok((judge, side, Err(e))) => {
                    warn!(session_id = %session.id, round, judge, %side, error = %e, "judge evaluation failed; applying default score");
                }
                Err(e) => {
                    warn!(session_id = %session.id, round, error = %e, "judge task panicked; applying default score");
                }
            }
        }

        let now = Utc::now();
        let records: Vec<RoundScoreRecord> = panel
            .iter()
            .flat_map(|&(judge, role_id)| Side::BOTH.map(|side| (judge, role_id, side)))
            .map(|(judge, judge_role_id, side)| {
                let (score, feedback) = match judgments.remove(&(judge, side)) {
                    Some(j) => (j.score, j.feedback),
                    None => (DEFAULT_ROUND_SCORE, DEFAULT_ROUND_FEEDBACK.to_string()),
                };
                RoundScoreRecord {
                    id: Uuid::new_v4(),
                    session_id: session.id,
                    round,
                    judge,
                    judge_role_id,
                    side,
                    score,
                    feedback,
                    scored_at: now,
                }
            })
            .collect();

        let scores = averages(round, &records);
        self.store.insert_round_scores(records).await?;

        info!(
            session_id = %session.id,
            round,
            affirmative = scores.affirmative,
            negative = scores.negative,
            "round scored"
        );
        Ok(scores)
    }

    /// Running totals over every scored round.
    pub async fn cumulative_scores(&self, session: &Session) -> Result<CumulativeScores, DebateError> {
        let records = latest_records(self.store.round_scores(session.id).await?);
        let rounds: Vec<u32> = {
            let mut rounds: Vec<u32> = records.iter().map(|r| r.round).collect();
            rounds.dedup();
            rounds
        };

        let (affirmative_total, negative_total) = rounds
            .iter()
            .map(|&round| averages(round, &records))
            .fold((0.0, 0.0), |(aff, neg), s| (aff + s.affirmative, neg + s.negative));

        Ok(CumulativeScores {
            affirmative_total: round_half_up(affirmative_total),
            negative_total: round_half_up(negative_total),
            max_possible: session.max_possible(),
            rounds_scored: rounds.len() as u32,
        })
    }

    /// Judge records and averages for one round.
    pub async fn round_breakdown(
        &self,
        session_id: Uuid,
        round: u32,
    ) -> Result<RoundBreakdown, DebateError> {
        let records: Vec<RoundScoreRecord> = latest_records(self.store.round_scores(session_id).await?)
            .into_iter()
            .filter(|r| r.round == round)
            .collect();
        let scores = averages(round, &records);
        let (affirmative, negative) = records
            .into_iter()
            .partition(|r| r.side == Side::Affirmative);

        Ok(RoundBreakdown {
            round,
            affirmative,
            negative,
            affirmative_average: scores.affirmative,
            negative_average: scores.negative,
        })
    }
}

/// One judge evaluation, retried on upstream errors and unparsable answers.
async fn evaluate(
    generator: &dyn TextGenerator,
    prompt: &Prompt,
    policy: &RetryPolicy,
) -> Result<Judgment, DebateError> {
    let mut last_error = DebateError::Generation("no attempts were made".to_string());

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay(attempt - 1)).await;
        }
        match generator.complete(prompt).await.and_then(|raw| parse_judgment(&raw)) {
            Ok(judgment) => return Ok(judgment),
            Err(e) => {
                debug!(purpose = ?prompt.purpose, attempt, error = %e, "judge attempt failed");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::debate_format::{ClassicFormat, DebateFormat};
    use crate::mock::MockGenerator;
    use crate::participant::{Persona, RoleKind};
    use crate::session::{Language, SessionParams, Speed};
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        session: Session,
        judges: Vec<Role>,
    }

    async fn fixture(rounds_argued: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(SessionParams {
            topic_id: Uuid::new_v4(),
            affirmative: Persona::new("Analytical", "Expert"),
            negative: Persona::new("Passionate", "Expert"),
            speed: Speed::Fast,
            rounds: 5,
            language: Language::En,
        });
        store.insert_session(session.clone()).await.unwrap();
        let judges: Vec<Role> = (1..=3)
            .map(|n| Role::new(session.id, RoleKind::Judge(n)))
            .collect();
        for round in 1..=rounds_argued {
            for side in Side::BOTH {
                store
                    .insert_argument(Argument::new(
                        session.id,
                        Uuid::new_v4(),
                        side,
                        round,
                        format!("{} argument for round {}", side, round),
                    ))
                    .await
                    .unwrap();
            }
        }
        Fixture {
            store,
            session,
            judges,
        }
    }

    fn engine(store: Arc<MemoryStore>, mock: MockGenerator) -> ScoringEngine {
        ScoringEngine::new(store, Arc::new(mock), &default_config())
    }

    fn plan(round: u32) -> RoundPlan {
        ClassicFormat::new(5).round_plan(round, Language::En)
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2.675), 2.68);
        assert_eq!(round_half_up(81.0), 81.0);
        assert_eq!(round_half_up(80.333333), 80.33);
        assert_eq!(round_half_up(79.995), 80.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_round_averages_judges() {
        let f = fixture(1).await;
        let engine = engine(f.store.clone(), MockGenerator::new());
        let scores = engine
            .score_round(&f.session, "Should AI be regulated?", &plan(1), &f.judges)
            .await
            .unwrap();
        assert_eq!(scores.affirmative, 81.0);
        assert_eq!(scores.negative, 79.0);
        assert_eq!(f.store.round_scores(f.session.id).await.unwrap().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_and_malformed_judges_get_default() {
        let f = fixture(1).await;
        let mock = MockGenerator::new()
            .fail_judge(1, Side::Affirmative)
            .malformed_judge(2, Side::Negative);
        let engine = engine(f.store.clone(), mock);
        let scores = engine
            .score_round(&f.session, "topic", &plan(1), &f.judges)
            .await
            .unwrap();

        // Affirmative: 75 (default), 81, 82.
        assert_eq!(scores.affirmative, round_half_up((75.0 + 81.0 + 82.0) / 3.0));
        // Negative: 78, 75 (default), 80.
        assert_eq!(scores.negative, round_half_up((78.0 + 75.0 + 80.0) / 3.0));

        let records = f.store.round_scores(f.session.id).await.unwrap();
        assert_eq!(records.len(), 6);
        let defaults: Vec<_> = records
            .iter()
            .filter(|r| r.feedback == DEFAULT_ROUND_FEEDBACK)
            .map(|r| (r.judge, r.side))
            .collect();
        assert_eq!(defaults, vec![(1, Side::Affirmative), (2, Side::Negative)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_judge_times_out_without_blocking_siblings() {
        let f = fixture(1).await;
        let mock = MockGenerator::new().slow_judge(3, Side::Negative, Duration::from_secs(600));
        let engine = engine(f.store.clone(), mock);
        let scores = engine
            .score_round(&f.session, "topic", &plan(1), &f.judges)
            .await
            .unwrap();
        assert_eq!(scores.affirmative, 81.0);
        assert_eq!(scores.negative, round_half_up((78.0 + 79.0 + 75.0) / 3.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_judges_evaluate_concurrently() {
        let f = fixture(1).await;
        let mut mock = MockGenerator::new();
        for judge in 1..=3 {
            for side in Side::BOTH {
                mock = mock.slow_judge(judge, side, Duration::from_secs(10));
            }
        }
        let engine = engine(f.store.clone(), mock);

        let started = tokio::time::Instant::now();
        let scores = engine
            .score_round(&f.session, "topic", &plan(1), &f.judges)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        // Six sequential evaluations would take a minute.
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(20), "took {:?}", elapsed);
        assert_eq!(scores.affirmative, 81.0);
        assert_eq!(scores.negative, 79.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_argument_is_an_error() {
        let f = fixture(1).await;
        let engine = engine(f.store.clone(), MockGenerator::new());
        let err = engine
            .score_round(&f.session, "topic", &plan(2), &f.judges)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DebateError::MissingArgument {
                round: 2,
                side: Side::Affirmative
            }
        ));
        assert!(f.store.round_scores(f.session.id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cumulative_is_sum_of_round_averages() {
        let f = fixture(3).await;
        let engine = engine(f.store.clone(), MockGenerator::new().fail_judge(2, Side::Affirmative));
        let mut aff = 0.0;
        let mut neg = 0.0;
        for round in 1..=3 {
            let s = engine
                .score_round(&f.session, "topic", &plan(round), &f.judges)
                .await
                .unwrap();
            aff += s.affirmative;
            neg += s.negative;
        }
        let totals = engine.cumulative_scores(&f.session).await.unwrap();
        assert_eq!(totals.affirmative_total, round_half_up(aff));
        assert_eq!(totals.negative_total, round_half_up(neg));
        assert_eq!(totals.rounds_scored, 3);
        assert_eq!(totals.max_possible, 500.0);
        assert!(totals.affirmative_total <= totals.max_possible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_breakdown_splits_sides() {
        let f = fixture(1).await;
        let engine = engine(f.store.clone(), MockGenerator::new());
        engine
            .score_round(&f.session, "topic", &plan(1), &f.judges)
            .await
            .unwrap();
        let breakdown = engine.round_breakdown(f.session.id, 1).await.unwrap();
        assert_eq!(breakdown.affirmative.len(), 3);
        assert_eq!(breakdown.negative.len(), 3);
        assert_eq!(breakdown.affirmative_average, 81.0);
        assert!(breakdown.affirmative.iter().all(|r| r.side == Side::Affirmative));
    }
}
