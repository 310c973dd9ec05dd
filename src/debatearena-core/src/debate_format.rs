//! Debate format definitions and trait.
//!
//! A format tells debaters what each round is for. The number of rounds is
//! a session parameter, so formats build their plan for any round count.

use serde::{Deserialize, Serialize};

use crate::session::Language;

/// What a single round asks of the debaters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundPlan {
    pub number: u32,
    /// Name announced for the round, e.g. "Opening Statements".
    pub name: String,
    pub objective: String,
    pub guidance: String,
}

/// Trait for defining debate formats.
///
/// Implement this trait to add formats with a different round structure.
pub trait DebateFormat: Send + Sync {
    /// Returns the name of this debate format.
    fn name(&self) -> &str;

    /// Returns the display name for the format.
    fn display_name(&self) -> &str;

    fn rounds(&self) -> u32;

    /// Plan for round `number` (1-based) in the given language.
    fn round_plan(&self, number: u32, language: Language) -> RoundPlan;

    /// Plans for every round in order.
    fn plans(&self, language: Language) -> Vec<RoundPlan> {
        (1..=self.rounds())
            .map(|n| self.round_plan(n, language))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Opening,
    Rebuttal,
    CrossExamination,
    Defense,
    Closing,
}

impl Stage {
    fn texts(self, language: Language) -> (&'static str, &'static str, &'static str) {
        match (self, language) {
            (Stage::Opening, Language::En) => (
                "Opening Statements",
                "Present position and core arguments",
                "Clearly state your claim with initial evidence",
            ),
            (Stage::Rebuttal, Language::En) => (
                "Rebuttals",
                "Counter opposing arguments",
                "Point out weaknesses in opponent's reasoning",
            ),
            (Stage::CrossExamination, Language::En) => (
                "Cross-Examination",
                "Challenge opponent's logic",
                "Use questions to reveal contradictions",
            ),
            (Stage::Defense, Language::En) => (
                "Defense",
                "Strengthen your position",
                "Address challenges and reinforce arguments",
            ),
            (Stage::Closing, Language::En) => (
                "Closing Arguments",
                "Final summary and persuasion",
                "Synthesize the debate with powerful conclusion",
            ),
            (Stage::Opening, Language::Zh) => (
                "开篇立论",
                "阐明立场与核心论点",
                "清晰陈述主张并给出初步论据",
            ),
            (Stage::Rebuttal, Language::Zh) => (
                "驳论",
                "反驳对方论点",
                "指出对方推理中的漏洞",
            ),
            (Stage::CrossExamination, Language::Zh) => (
                "质询",
                "挑战对方逻辑",
                "通过提问揭示对方的矛盾",
            ),
            (Stage::Defense, Language::Zh) => (
                "防守",
                "巩固己方立场",
                "回应质疑并强化论证",
            ),
            (Stage::Closing, Language::Zh) => (
                "总结陈词",
                "最终总结与说服",
                "综合全场辩论，给出有力结论",
            ),
        }
    }
}

/// Classic format: opening first, closing last, and the middle rounds
/// cycling through rebuttal, cross-examination and defense.
#[derive(Debug, Clone)]
pub struct ClassicFormat {
    rounds: u32,
}

impl ClassicFormat {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(1),
        }
    }

    fn stage(&self, number: u32) -> Stage {
        const MIDDLE: [Stage; 3] = [Stage::Rebuttal, Stage::CrossExamination, Stage::Defense];
        if number <= 1 {
            Stage::Opening
        } else if number >= self.rounds {
            Stage::Closing
        } else {
            MIDDLE[((number - 2) % 3) as usize]
        }
    }
}

impl Default for ClassicFormat {
    fn default() -> Self {
        Self::new(5)
    }
}

impl DebateFormat for ClassicFormat {
    fn name(&self) -> &str {
        "classic"
    }

    fn display_name(&self) -> &str {
        "Classic Debate (Opening, Rebuttal, Cross-Examination, Defense, Closing)"
    }

    fn rounds(&self) -> u32 {
        self.rounds
    }

    fn round_plan(&self, number: u32, language: Language) -> RoundPlan {
        let (name, objective, guidance) = self.stage(number).texts(language);
        RoundPlan {
            number,
            name: name.to_string(),
            objective: objective.to_string(),
            guidance: guidance.to_string(),
        }
    }
}

/// Get a debate format by name with specified rounds.
pub fn get_format(name: &str, rounds: u32) -> Option<Box<dyn DebateFormat>> {
    match name.to_lowercase().as_str() {
        "classic" => Some(Box::new(ClassicFormat::new(rounds))),
        _ => None,
    }
}

/// List all available debate format names.
pub fn available_formats() -> Vec<&'static str> {
    vec!["classic"]
}
