//! Deterministic offline generator.
//!
//! Produces canned text for every [`Purpose`], streamed word by word, and
//! records each request so callers can check what was generated. Judges can
//! be told to fail, answer garbage or stall for a given side.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::error::DebateError;
use crate::llm::{ChunkStream, Prompt, Purpose, TextGenerator};
use crate::participant::Side;

#[derive(Debug)]
pub struct MockGenerator {
    affirmative_base: f64,
    negative_base: f64,
    failing_judges: HashSet<(u8, Side)>,
    malformed_judges: HashSet<(u8, Side)>,
    slow_judges: HashMap<(u8, Side), Duration>,
    fail_arguments: bool,
    calls: Mutex<Vec<Purpose>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            affirmative_base: 80.0,
            negative_base: 78.0,
            failing_judges: HashSet::new(),
            malformed_judges: HashSet::new(),
            slow_judges: HashMap::new(),
            fail_arguments: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Base judge score per side. Judge `n` adds `n - 1` to the base.
    pub fn with_scores(mut self, affirmative: f64, negative: f64) -> Self {
        self.affirmative_base = affirmative;
        self.negative_base = negative;
        self
    }

    pub fn fail_judge(mut self, judge: u8, side: Side) -> Self {
        self.failing_judges.insert((judge, side));
        self
    }

    pub fn malformed_judge(mut self, judge: u8, side: Side) -> Self {
        self.malformed_judges.insert((judge, side));
        self
    }

    pub fn slow_judge(mut self, judge: u8, side: Side, delay: Duration) -> Self {
        self.slow_judges.insert((judge, side), delay);
        self
    }

    /// Make every argument request fail so debaters fall back.
    pub fn fail_arguments(mut self) -> Self {
        self.fail_arguments = true;
        self
    }

    /// Every purpose requested so far, in order.
    pub fn calls(&self) -> Vec<Purpose> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, predicate: impl Fn(&Purpose) -> bool) -> usize {
        self.calls().iter().filter(|p| predicate(p)).count()
    }

    fn judge_score(&self, judge: u8, side: Side) -> f64 {
        let base = match side {
            Side::Affirmative => self.affirmative_base,
            Side::Negative => self.negative_base,
        };
        (base + f64::from(judge.saturating_sub(1))).clamp(0.0, 100.0)
    }

    fn text_for(&self, purpose: Purpose) -> Result<String, DebateError> {
        let text = match purpose {
            Purpose::Argument { side, round } => {
                if self.fail_arguments {
                    return Err(DebateError::Generation("mock argument failure".to_string()));
                }
                format!(
                    "In round {} the {} side argues that the evidence clearly favors its position.",
                    round, side
                )
            }
            Purpose::Summary { side, round } => {
                format!("The {} side made its round {} case.", side, round)
            }
            Purpose::Evaluation { side, round } => format!(
                "The {} argument in round {} was structured and relevant.",
                side, round
            ),
            Purpose::RoundJudgment { judge, side, .. } => {
                if self.failing_judges.contains(&(judge, side)) {
                    return Err(DebateError::Generation(format!("judge {} unavailable", judge)));
                }
                if self.malformed_judges.contains(&(judge, side)) {
                    return Ok("I liked it a lot".to_string());
                }
                format!(
                    r#"{{"score": {}, "feedback": "Judge {} found the {} argument convincing."}}"#,
                    self.judge_score(judge, side),
                    judge,
                    side
                )
            }
            Purpose::CriterionJudgment { judge, criterion } => format!(
                r#"{{"score": {}, "feedback": "{} looked solid to judge {}."}}"#,
                70.0 + f64::from(judge) * 2.0,
                criterion.name(),
                judge
            ),
        };
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn stream(&self, prompt: &Prompt) -> Result<ChunkStream, DebateError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.purpose);
        }

        if let Purpose::RoundJudgment { judge, side, .. } = prompt.purpose
            && let Some(delay) = self.slow_judges.get(&(judge, side))
        {
            tokio::time::sleep(*delay).await;
        }

        let text = self.text_for(prompt.purpose)?;
        let chunks: Vec<Result<String, DebateError>> = text
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn judgment(judge: u8, side: Side) -> Prompt {
        Prompt::new(
            Purpose::RoundJudgment {
                judge,
                side,
                round: 1,
            },
            "",
            "",
        )
    }

    #[tokio::test]
    async fn test_mock_streams_words() {
        let mock = MockGenerator::new();
        let prompt = Prompt::new(
            Purpose::Summary {
                side: Side::Negative,
                round: 2,
            },
            "",
            "",
        );
        let chunks: Vec<String> = mock
            .stream(&prompt)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), "The negative side made its round 2 case.");
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_judge_scores_and_failures() {
        let mock = MockGenerator::new().fail_judge(2, Side::Negative);
        let text = mock.complete(&judgment(3, Side::Affirmative)).await.unwrap();
        assert!(text.contains("\"score\": 82"));
        assert!(mock.complete(&judgment(2, Side::Negative)).await.is_err());
        assert_eq!(mock.calls().len(), 2);
    }
}
