//! Judge prompts and judgment parsing.

use serde::Deserialize;

use crate::argument_scoring::ScoringRule;
use crate::debate_format::RoundPlan;
use crate::error::DebateError;
use crate::llm::{Prompt, Purpose, sanitize_response};
use crate::participant::Side;
use crate::records::Argument;
use crate::session::Language;

/// Number of earlier rounds quoted to judges.
const CONTEXT_ROUNDS: u32 = 2;
/// Characters quoted per earlier argument.
const CONTEXT_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Judgment {
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
}

/// Extract `{"score": .., "feedback": ..}` from a judge response.
///
/// Surrounding prose and reasoning tags are ignored. A missing object,
/// invalid JSON or a score outside `0..=100` is rejected.
pub fn parse_judgment(raw: &str) -> Result<Judgment, DebateError> {
    let cleaned = sanitize_response(raw);
    let malformed = || DebateError::MalformedJudgment(truncate(&cleaned, 80));

    let start = cleaned.find('{').ok_or_else(malformed)?;
    let end = cleaned.rfind('}').ok_or_else(malformed)?;
    if end < start {
        return Err(malformed());
    }

    let mut judgment: Judgment = serde_json::from_str(&cleaned[start..=end])
        .map_err(|e| DebateError::MalformedJudgment(e.to_string()))?;

    if !judgment.score.is_finite() || !(0.0..=100.0).contains(&judgment.score) {
        return Err(DebateError::MalformedJudgment(format!(
            "score {} out of range",
            judgment.score
        )));
    }
    judgment.feedback = judgment.feedback.trim().to_string();
    Ok(judgment)
}

/// First `max` characters of `text`, with `...` appended when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Quotes from up to two rounds before `round`, latest argument per side.
pub fn previous_rounds_context(arguments: &[Argument], round: u32, language: Language) -> String {
    let first = round.saturating_sub(CONTEXT_ROUNDS).max(1);
    let mut lines = Vec::new();

    for earlier in first..round {
        for side in Side::BOTH {
            if let Some(argument) = arguments
                .iter()
                .rev()
                .find(|a| a.round == earlier && a.side == side)
            {
                let quote: String = argument.text.chars().take(CONTEXT_CHARS).collect();
                lines.push(format!(
                    "Round {} {}: {}...",
                    earlier,
                    side.label(language),
                    quote
                ));
            }
        }
    }

    lines.join("\n")
}

const ROUND_RUBRIC: &str = r#"Score the argument from 0 to 100 using these weighted criteria:
- Argument Quality (40%): logic, evidence and clarity of the claim
- Rebuttal Effectiveness (30%): how well it answers the opposing side
- Rhetorical Impact (20%): persuasiveness and delivery
- Strategic Positioning (10%): how well it fits the round's objective

Respond with JSON only, in exactly this shape:
{"score": 85.5, "feedback": "one or two sentences"}"#;

/// Prompt asking one judge to score one side's argument for a round.
#[allow(clippy::too_many_arguments)]
pub fn round_judgment_prompt(
    judge: u8,
    side: Side,
    topic: &str,
    plan: &RoundPlan,
    argument: &Argument,
    opponent: &Argument,
    context: &str,
    language: Language,
) -> Prompt {
    let system = format!(
        "You are Judge {}, an impartial and experienced debate judge.\n\n{}{}",
        judge,
        ROUND_RUBRIC,
        feedback_language(language)
    );

    let mut user = format!(
        "DEBATE TOPIC: {}\nROUND {}: {} ({})\n\n",
        topic, plan.number, plan.name, plan.objective
    );
    if !context.is_empty() {
        user.push_str("EARLIER ROUNDS:\n");
        user.push_str(context);
        user.push_str("\n\n");
    }
    user.push_str(&format!(
        "OPPOSING {} ARGUMENT:\n{}\n\n{} ARGUMENT TO SCORE:\n{}",
        side.opponent().display_name(),
        opponent.text,
        side.display_name(),
        argument.text
    ));

    Prompt::new(
        Purpose::RoundJudgment {
            judge,
            side,
            round: plan.number,
        },
        system,
        user,
    )
}

/// Prompt asking one judge to score an argument on a single criterion.
pub fn criterion_judgment_prompt(
    judge: u8,
    rule: &ScoringRule,
    topic: &str,
    argument: &Argument,
) -> Prompt {
    let system = format!(
        "You are Judge {}, an impartial debate judge. Score only the {} of the argument: {}.\n\
         Give a score from 0 to {}. Respond with JSON only: {{\"score\": <number>, \"feedback\": \"...\"}}",
        judge,
        rule.criterion.name(),
        rule.description,
        rule.max_score
    );
    let user = format!(
        "DEBATE TOPIC: {}\n{} ARGUMENT (round {}):\n{}",
        topic,
        argument.side.display_name(),
        argument.round,
        argument.text
    );

    Prompt::new(
        Purpose::CriterionJudgment {
            judge,
            criterion: rule.criterion,
        },
        system,
        user,
    )
}

fn feedback_language(language: Language) -> &'static str {
    match language {
        Language::En => "",
        Language::Zh => "\n\nWrite the feedback in Chinese.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn argument(round: u32, side: Side, text: &str) -> Argument {
        Argument::new(Uuid::nil(), Uuid::nil(), side, round, text.to_string())
    }

    #[test]
    fn test_parse_plain_json() {
        let j = parse_judgment(r#"{"score": 85.5, "feedback": "Strong evidence."}"#).unwrap();
        assert_eq!(j.score, 85.5);
        assert_eq!(j.feedback, "Strong evidence.");
    }

    #[test]
    fn test_parse_json_inside_prose_and_reasoning() {
        let raw = "<think>hmm</think>Here is my verdict:\n```json\n{\"score\": 72, \"feedback\": \"Fine\"}\n```";
        let j = parse_judgment(raw).unwrap();
        assert_eq!(j.score, 72.0);
    }

    #[test]
    fn test_parse_missing_feedback_defaults_empty() {
        let j = parse_judgment(r#"{"score": 60}"#).unwrap();
        assert_eq!(j.feedback, "");
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(matches!(
            parse_judgment(r#"{"score": 140, "feedback": "wow"}"#),
            Err(DebateError::MalformedJudgment(_))
        ));
        assert!(parse_judgment(r#"{"score": -1}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_judgment("I liked it a lot").is_err());
        assert!(parse_judgment("} backwards {").is_err());
        assert!(parse_judgment(r#"{"feedback": "no score"}"#).is_err());
    }

    #[test]
    fn test_previous_context_two_rounds() {
        let long = "x".repeat(150);
        let args = vec![
            argument(1, Side::Affirmative, "first aff"),
            argument(1, Side::Negative, "first neg"),
            argument(2, Side::Affirmative, &long),
            argument(2, Side::Negative, "second neg"),
            argument(3, Side::Affirmative, "third aff"),
            argument(3, Side::Negative, "third neg"),
        ];
        let context = previous_rounds_context(&args, 4, Language::En);
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], format!("Round 2 Affirmative: {}...", "x".repeat(100)));
        assert_eq!(lines[3], "Round 3 Negative: third neg...");
        assert!(previous_rounds_context(&args, 1, Language::En).is_empty());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
