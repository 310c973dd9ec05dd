//! Weighted per-argument scoring.
//!
//! Each judge scores an individual argument on logic, persuasiveness and
//! fluency. The argument's score is the weighted sum of the per-criterion
//! judge averages. This is an on-demand query; round progression uses
//! [`crate::scoring`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::DebateError;
use crate::judge::{criterion_judgment_prompt, parse_judgment};
use crate::llm::{RetryPolicy, TextGenerator, complete_with_retry};
use crate::participant::Role;
use crate::records::Argument;
use crate::scoring::round_half_up;
use crate::store::DebateStore;

pub const FALLBACK_FEEDBACK: &str = "Unable to provide detailed feedback at this time.";
/// Share of the maximum awarded when a judge cannot score a criterion.
const FALLBACK_SHARE: f64 = 0.6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criterion {
    Logic,
    Persuasiveness,
    Fluency,
}

impl Criterion {
    pub const ALL: [Criterion; 3] = [Criterion::Logic, Criterion::Persuasiveness, Criterion::Fluency];

    pub fn name(self) -> &'static str {
        match self {
            Criterion::Logic => "Logic",
            Criterion::Persuasiveness => "Persuasiveness",
            Criterion::Fluency => "Fluency",
        }
    }

    pub fn weight(self) -> f64 {
        match self {
            Criterion::Logic => 0.40,
            Criterion::Persuasiveness => 0.35,
            Criterion::Fluency => 0.25,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Criterion::Logic => "Evaluates the logical structure, reasoning, and evidence quality",
            Criterion::Persuasiveness => {
                "Assesses the argument's convincing power and rhetorical effectiveness"
            }
            Criterion::Fluency => "Measures clarity, coherence, and linguistic quality",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRule {
    pub id: Uuid,
    pub session_id: Uuid,
    pub criterion: Criterion,
    pub max_score: f64,
    pub weight: f64,
    pub description: String,
}

/// The three criteria every session is scored on.
pub fn create_scoring_rules(session_id: Uuid) -> Vec<ScoringRule> {
    Criterion::ALL
        .into_iter()
        .map(|criterion| ScoringRule {
            id: Uuid::new_v4(),
            session_id,
            criterion,
            max_score: 100.0,
            weight: criterion.weight(),
            description: criterion.description().to_string(),
        })
        .collect()
}

/// One judge's score for one criterion of one argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: Uuid,
    pub argument_id: Uuid,
    pub judge: u8,
    pub rule_id: Uuid,
    pub score: f64,
    pub feedback: String,
    pub scored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ArgumentBreakdown {
    pub argument_id: Uuid,
    pub total_score: f64,
    pub records: Vec<ScoreRecord>,
}

/// Weighted sum of per-criterion judge averages, rounded to two decimals.
pub fn weighted_score(rules: &[ScoringRule], records: &[ScoreRecord]) -> f64 {
    let total: f64 = rules
        .iter()
        .filter_map(|rule| {
            let scores: Vec<f64> = records
                .iter()
                .filter(|r| r.rule_id == rule.id)
                .map(|r| r.score)
                .collect();
            if scores.is_empty() {
                return None;
            }
            let average = round_half_up(scores.iter().sum::<f64>() / scores.len() as f64);
            Some(average * rule.weight)
        })
        .sum();
    round_half_up(total)
}

pub struct ArgumentScorer {
    store: Arc<dyn DebateStore>,
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    max_tokens: u32,
    model: String,
}

impl ArgumentScorer {
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
            max_tokens: config.generation.judgment_max_tokens,
            model: config.judge_model().to_string(),
        }
    }

    /// Have every judge score every criterion of `argument`, one after another.
    pub async fn score_argument(
        &self,
        argument: &Argument,
        topic: &str,
        judges: &[Role],
    ) -> Result<Vec<ScoreRecord>, DebateError> {
        let rules = self.store.scoring_rules(argument.session_id).await?;
        let mut panel: Vec<u8> = judges.iter().filter_map(Role::judge_number).collect();
        panel.sort_unstable();

        let mut records = Vec::with_capacity(panel.len() * rules.len());
        for judge in panel {
            for rule in &rules {
                let prompt = criterion_judgment_prompt(judge, rule, topic, argument)
                    .with_max_tokens(self.max_tokens)
                    .with_model(Some(self.model.clone()));

                let judged = complete_with_retry(self.generator.as_ref(), &prompt, &self.policy)
                    .await
                    .and_then(|raw| parse_judgment(&raw))
                    .and_then(|j| {
                        if j.score <= rule.max_score {
                            Ok(j)
                        } else {
                            Err(DebateError::MalformedJudgment(format!(
                                "score {} above {}",
                                j.score, rule.max_score
                            )))
                        }
                    });

                let (score, feedback) = match judged {
                    Ok(j) => (j.score, j.feedback),
                    Err(e) => {
                        warn!(argument_id = %argument.id, judge, criterion = rule.criterion.name(), error = %e, "criterion judgment failed; applying fallback");
                        (rule.max_score * FALLBACK_SHARE, FALLBACK_FEEDBACK.to_string())
                    }
                };

                records.push(ScoreRecord {
                    id: Uuid::new_v4(),
                    argument_id: argument.id,
                    judge,
                    rule_id: rule.id,
                    score,
                    feedback,
                    scored_at: Utc::now(),
                });
            }
        }

        self.store.insert_score_records(records.clone()).await?;
        info!(argument_id = %argument.id, records = records.len(), "argument scored");
        Ok(records)
    }

    pub async fn argument_score(&self, argument: &Argument) -> Result<f64, DebateError> {
        let rules = self.store.scoring_rules(argument.session_id).await?;
        let records = self.store.score_records(argument.id).await?;
        Ok(weighted_score(&rules, &records))
    }

    /// Rounded sum of the weighted scores of `arguments`.
    pub async fn total_score(&self, arguments: &[Argument]) -> Result<f64, DebateError> {
        let mut total = 0.0;
        for argument in arguments {
            total += self.argument_score(argument).await?;
        }
        Ok(round_half_up(total))
    }

    pub async fn breakdown(&self, argument: &Argument) -> Result<ArgumentBreakdown, DebateError> {
        let records = self.store.score_records(argument.id).await?;
        let rules = self.store.scoring_rules(argument.session_id).await?;
        Ok(ArgumentBreakdown {
            argument_id: argument.id,
            total_score: weighted_score(&rules, &records),
            records,
        })
    }
}
