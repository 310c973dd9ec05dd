//! Checkpoints name the exact sub-step a paused debate resumes at.
//!
//! Two textual forms exist:
//! - `round_{n}_{side}_{timing}`: a precise sub-step, e.g. `round_3_negative_after`.
//! - `round_{n}`: a coarse legacy form that restarts the whole round.

use std::fmt;
use std::str::FromStr;

use crate::error::DebateError;
use crate::participant::Side;
use crate::session::Speaker;

/// Whether the pause happened before or after the side's argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Before,
    After,
}

impl Timing {
    pub fn as_str(self) -> &'static str {
        match self {
            Timing::Before => "before",
            Timing::After => "after",
        }
    }
}

/// The fixed sub-steps of a round, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStep {
    AffirmativeArgument,
    AffirmativeFeedback,
    NegativeArgument,
    NegativeFeedback,
    Scoring,
}

impl RoundStep {
    pub const ALL: [RoundStep; 5] = [
        RoundStep::AffirmativeArgument,
        RoundStep::AffirmativeFeedback,
        RoundStep::NegativeArgument,
        RoundStep::NegativeFeedback,
        RoundStep::Scoring,
    ];

    /// Steps to run when entering a round at `entry`.
    pub fn from_entry(entry: RoundStep) -> impl Iterator<Item = RoundStep> {
        RoundStep::ALL.into_iter().skip_while(move |step| *step != entry)
    }

    /// Checkpoint persisted when a pause is honored just before this step.
    /// Scoring is never a pause boundary.
    pub fn checkpoint(self, round: u32) -> Option<Checkpoint> {
        let (side, timing) = match self {
            RoundStep::AffirmativeArgument => (Side::Affirmative, Timing::Before),
            RoundStep::AffirmativeFeedback => (Side::Affirmative, Timing::After),
            RoundStep::NegativeArgument => (Side::Negative, Timing::Before),
            RoundStep::NegativeFeedback => (Side::Negative, Timing::After),
            RoundStep::Scoring => return None,
        };
        Some(Checkpoint::Step {
            round,
            side,
            timing,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Legacy `round_{n}`.
    Round(u32),
    Step { round: u32, side: Side, timing: Timing },
}

impl Checkpoint {
    pub fn round(&self) -> u32 {
        match self {
            Checkpoint::Round(round) | Checkpoint::Step { round, .. } => *round,
        }
    }

    /// Position inside the round, as reported by `debate_paused`.
    pub fn position(&self) -> String {
        match self {
            Checkpoint::Round(_) => "round_start".to_string(),
            Checkpoint::Step { side, timing, .. } => {
                format!("{}_{}", side.as_str(), timing.as_str())
            }
        }
    }

    /// Who speaks first once the debate resumes from here.
    pub fn pending_speaker(&self) -> Speaker {
        match self {
            Checkpoint::Round(_) => Speaker::Affirmative,
            Checkpoint::Step {
                side,
                timing: Timing::Before,
                ..
            } => Speaker::from(*side),
            Checkpoint::Step {
                timing: Timing::After,
                ..
            } => Speaker::Moderator,
        }
    }

    pub fn entry_step(&self) -> RoundStep {
        match self {
            Checkpoint::Round(_) => RoundStep::AffirmativeArgument,
            Checkpoint::Step { side, timing, .. } => match (side, timing) {
                (Side::Affirmative, Timing::Before) => RoundStep::AffirmativeArgument,
                (Side::Affirmative, Timing::After) => RoundStep::AffirmativeFeedback,
                (Side::Negative, Timing::Before) => RoundStep::NegativeArgument,
                (Side::Negative, Timing::After) => RoundStep::NegativeFeedback,
            },
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::Round(round) => write!(f, "round_{}", round),
            Checkpoint::Step {
                round,
                side,
                timing,
            } => write!(f, "round_{}_{}_{}", round, side.as_str(), timing.as_str()),
        }
    }
}

impl FromStr for Checkpoint {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DebateError::InvalidCheckpoint(s.to_string());

        let rest = s.strip_prefix("round_").ok_or_else(invalid)?;
        let parts: Vec<&str> = rest.split('_').collect();
        let round: u32 = parts
            .first()
            .and_then(|n| n.parse().ok())
            .ok_or_else(invalid)?;

        match parts.as_slice() {
            [_] => Ok(Checkpoint::Round(round)),
            [_, side, timing] => {
                let side = match *side {
                    "affirmative" => Side::Affirmative,
                    "negative" => Side::Negative,
                    _ => return Err(invalid()),
                };
                let timing = match *timing {
                    "before" => Timing::Before,
                    "after" => Timing::After,
                    _ => return Err(invalid()),
                };
                Ok(Checkpoint::Step {
                    round,
                    side,
                    timing,
                })
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_precise_checkpoint() {
        let cp: Checkpoint = "round_3_negative_after".parse().unwrap();
        assert_eq!(
            cp,
            Checkpoint::Step {
                round: 3,
                side: Side::Negative,
                timing: Timing::After
            }
        );
        assert_eq!(cp.to_string(), "round_3_negative_after");
        assert_eq!(cp.position(), "negative_after");
        assert_eq!(cp.pending_speaker(), Speaker::Moderator);
        assert_eq!(cp.entry_step(), RoundStep::NegativeFeedback);
    }

    #[test]
    fn test_parse_legacy_checkpoint() {
        let cp: Checkpoint = "round_2".parse().unwrap();
        assert_eq!(cp, Checkpoint::Round(2));
        assert_eq!(cp.entry_step(), RoundStep::AffirmativeArgument);
        assert_eq!(cp.to_string(), "round_2");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in [
            "",
            "round_",
            "round_x",
            "round_1_neutral_before",
            "round_1_affirmative_during",
            "round_1_affirmative",
            "turn_1",
            "round_1_affirmative_before_extra",
        ] {
            assert!(bad.parse::<Checkpoint>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_before_checkpoint_names_side_as_speaker() {
        let cp: Checkpoint = "round_1_affirmative_before".parse().unwrap();
        assert_eq!(cp.pending_speaker(), Speaker::Affirmative);
        let cp: Checkpoint = "round_1_negative_before".parse().unwrap();
        assert_eq!(cp.pending_speaker(), Speaker::Negative);
    }

    #[test]
    fn test_step_checkpoints_round_trip_entry() {
        for step in RoundStep::ALL {
            match step.checkpoint(4) {
                Some(cp) => assert_eq!(cp.entry_step(), step),
                None => assert_eq!(step, RoundStep::Scoring),
            }
        }
    }

    #[test]
    fn test_from_entry_skips_earlier_steps() {
        let steps: Vec<_> = RoundStep::from_entry(RoundStep::NegativeArgument).collect();
        assert_eq!(
            steps,
            vec![
                RoundStep::NegativeArgument,
                RoundStep::NegativeFeedback,
                RoundStep::Scoring
            ]
        );
    }
}
