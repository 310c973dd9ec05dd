//! Configuration module for loading TOML config files.
//!
//! Every section has defaults, so a config file only needs the keys it
//! overrides.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::debate_format::RoundPlan;
use crate::error::DebateError;
use crate::moderation::BannedTerm;
use crate::participant::{Persona, Side};
use crate::session::{Language, Speed};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debate: DebateSettings,
    pub generation: GenerationConfig,
    pub scoring: ScoringConfig,
    pub personas: PersonasConfig,
    pub prompts: PromptsConfig,
    pub moderation: ModerationConfig,
}

impl Default for Config {
    fn default() -> Self {
        default_config()
    }
}

/// Defaults applied to new sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebateSettings {
    pub rounds: u32,
    pub judges: u8,
    pub language: Language,
    pub speed: Speed,
    pub format: String,
}

impl Default for DebateSettings {
    fn default() -> Self {
        Self {
            rounds: 5,
            judges: 3,
            language: Language::En,
            speed: Speed::Normal,
            format: "classic".to_string(),
        }
    }
}

/// Text generation backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    /// Model used for moderator narration and judging; falls back to `model`.
    pub judge_model: Option<String>,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub argument_max_tokens: u32,
    pub summary_max_tokens: u32,
    pub evaluation_max_tokens: u32,
    pub judgment_max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            judge_model: None,
            max_attempts: 3,
            backoff_base_ms: 1000,
            request_timeout_secs: 120,
            connect_timeout_secs: 30,
            argument_max_tokens: 600,
            summary_max_tokens: 300,
            evaluation_max_tokens: 400,
            judgment_max_tokens: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub judge_timeout_secs: u64,
    pub max_parallel_evaluations: usize,
    /// Attempts per judge evaluation before the default score is applied.
    pub judge_attempts: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            judge_timeout_secs: 60,
            max_parallel_evaluations: 6,
            judge_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonasConfig {
    pub affirmative: Persona,
    pub negative: Persona,
}

impl Default for PersonasConfig {
    fn default() -> Self {
        Self {
            affirmative: Persona::new("Analytical", "Expert"),
            negative: Persona::new("Passionate", "Expert"),
        }
    }
}

impl PersonasConfig {
    pub fn for_side(&self, side: Side) -> &Persona {
        match side {
            Side::Affirmative => &self.affirmative,
            Side::Negative => &self.negative,
        }
    }
}

/// System prompts configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Debater system prompt. Placeholders: `{personality}`, `{expertise}`,
    /// `{topic}`, `{side}`, `{round}`, `{rounds}`, `{round_name}`,
    /// `{objective}`, `{guidance}`.
    pub argument_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            argument_template: DEFAULT_ARGUMENT_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub banned_terms: Vec<BannedTerm>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DebateError> {
        if self.debate.rounds == 0 {
            return Err(DebateError::ConfigError(
                "debate.rounds must be at least 1".to_string(),
            ));
        }
        if self.debate.judges == 0 {
            return Err(DebateError::ConfigError(
                "debate.judges must be at least 1".to_string(),
            ));
        }
        if self.generation.max_attempts == 0 || self.scoring.judge_attempts == 0 {
            return Err(DebateError::ConfigError(
                "attempt counts must be at least 1".to_string(),
            ));
        }
        if self.scoring.max_parallel_evaluations == 0 {
            return Err(DebateError::ConfigError(
                "scoring.max_parallel_evaluations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the debater system prompt, with placeholders replaced.
    pub fn get_prompt(
        &self,
        side: Side,
        persona: &Persona,
        topic: &str,
        plan: &RoundPlan,
        rounds: u32,
    ) -> String {
        let position = match side {
            Side::Affirmative => "IN FAVOR of",
            Side::Negative => "AGAINST",
        };

        self.prompts
            .argument_template
            .replace("{personality}", &persona.personality)
            .replace("{expertise}", &persona.expertise_level)
            .replace("{topic}", topic)
            .replace("{side}", position)
            .replace("{round}", &plan.number.to_string())
            .replace("{rounds}", &rounds.to_string())
            .replace("{round_name}", &plan.name)
            .replace("{objective}", &plan.objective)
            .replace("{guidance}", &plan.guidance)
    }

    /// Model for narration and judging.
    pub fn judge_model(&self) -> &str {
        self.generation
            .judge_model
            .as_deref()
            .unwrap_or(&self.generation.model)
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        debate: DebateSettings::default(),
        generation: GenerationConfig::default(),
        scoring: ScoringConfig::default(),
        personas: PersonasConfig::default(),
        prompts: PromptsConfig::default(),
        moderation: ModerationConfig::default(),
    }
}

const DEFAULT_ARGUMENT_PROMPT: &str = r#"You are a {personality} debater with {expertise} level knowledge.

DEBATE TOPIC: {topic}

YOUR POSITION: You are arguing {side} the topic.

CURRENT ROUND: {round} of {rounds} - {round_name}
OBJECTIVE: {objective}
GUIDANCE: {guidance}

DEBATE RULES:
- Present clear, compelling arguments supported by evidence and reasoning
- Respond to your opponent's most recent points when they exist
- Stay consistent with what you argued in earlier rounds
- Do NOT acknowledge being an AI - stay fully in character

CRITICAL OUTPUT RULES:
- Output ONLY your spoken argument, at most 500 characters
- Do NOT include stage directions, narration or markdown formatting
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate_format::{ClassicFormat, DebateFormat};

    #[test]
    fn test_default_config_values() {
        let config = default_config();
        assert_eq!(config.debate.rounds, 5);
        assert_eq!(config.debate.judges, 3);
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.scoring.max_parallel_evaluations, 6);
        assert_eq!(config.personas.affirmative.personality, "Analytical");
        assert_eq!(config.personas.negative.personality, "Passionate");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::from_str(
            r#"
            [debate]
            rounds = 3
            language = "zh"

            [scoring]
            judge_timeout_secs = 10

            [[moderation.banned_terms]]
            term = "slur"
            severity = "CRITICAL"
            "#,
        )
        .unwrap();
        assert_eq!(config.debate.rounds, 3);
        assert_eq!(config.debate.judges, 3);
        assert_eq!(config.debate.language, Language::Zh);
        assert_eq!(config.scoring.judge_timeout_secs, 10);
        assert_eq!(config.scoring.judge_attempts, 2);
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.moderation.banned_terms.len(), 1);
        assert!(config.moderation.banned_terms[0].active);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let err = Config::from_str("[debate]\nrounds = 0\n").unwrap_err();
        assert!(matches!(err, DebateError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(Config::from_str("[debate\nrounds = ").is_err());
    }

    #[test]
    fn test_get_prompt_replaces_placeholders() {
        let config = default_config();
        let plan = ClassicFormat::new(5).round_plan(2, Language::En);
        let prompt = config.get_prompt(
            Side::Negative,
            &config.personas.negative,
            "Should AI be regulated?",
            &plan,
            5,
        );
        assert!(prompt.contains("Passionate debater"));
        assert!(prompt.contains("Should AI be regulated?"));
        assert!(prompt.contains("arguing AGAINST the topic"));
        assert!(prompt.contains("2 of 5 - Rebuttals"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_judge_model_falls_back() {
        let mut config = default_config();
        assert_eq!(config.judge_model(), "gpt-4o-mini");
        config.generation.judge_model = Some("judge-large".to_string());
        assert_eq!(config.judge_model(), "judge-large");
    }
}
