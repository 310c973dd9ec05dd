//! Argument generation for the two debaters.

use std::sync::Arc;

use crate::config::Config;
use crate::debate_format::RoundPlan;
use crate::llm::{Prompt, Purpose, RetryPolicy, TextGenerator, stream_resilient};
use crate::participant::{Persona, Side};
use crate::records::Argument;
use crate::session::Language;

/// History entries quoted in the prompt.
const HISTORY_WINDOW: usize = 6;

/// Everything a debater needs to argue one round.
#[derive(Debug, Clone)]
pub struct ArgumentRequest<'a> {
    pub topic: &'a str,
    pub side: Side,
    pub rounds: u32,
    pub persona: &'a Persona,
    /// Prior arguments from both sides, oldest first.
    pub history: &'a [Argument],
    pub plan: &'a RoundPlan,
    pub language: Language,
    pub instruction: Option<&'a str>,
}

/// Text used when generation keeps failing.
pub fn fallback_argument(side: Side, language: Language) -> &'static str {
    match (side, language) {
        (Side::Affirmative, Language::En) => {
            "I support this position based on compelling evidence and logical reasoning that demonstrates clear benefits."
        }
        (Side::Negative, Language::En) => {
            "I oppose this position as the evidence suggests significant concerns that outweigh potential benefits."
        }
        (Side::Affirmative, Language::Zh) => "基于有力的证据和严密的逻辑推理，我支持这一立场，它带来的益处显而易见。",
        (Side::Negative, Language::Zh) => "我反对这一立场，因为证据表明其中存在的重大隐患超过了潜在的益处。",
    }
}

pub struct Debater {
    generator: Arc<dyn TextGenerator>,
    config: Arc<Config>,
    policy: RetryPolicy,
}

impl Debater {
    pub fn new(generator: Arc<dyn TextGenerator>, config: Arc<Config>) -> Self {
        let policy = RetryPolicy::from_config(&config.generation);
        Self {
            generator,
            config,
            policy,
        }
    }

    pub fn prompt(&self, request: &ArgumentRequest<'_>) -> Prompt {
        let system = self.config.get_prompt(
            request.side,
            request.persona,
            request.topic,
            request.plan,
            request.rounds,
        );

        let mut user = String::new();
        let start = request.history.len().saturating_sub(HISTORY_WINDOW);
        if start < request.history.len() {
            user.push_str("DEBATE SO FAR:\n");
            for argument in &request.history[start..] {
                let speaker = if argument.side == request.side {
                    "You"
                } else {
                    "Opponent"
                };
                user.push_str(&format!(
                    "Round {} {} ({}): {}\n",
                    argument.round,
                    argument.side.label(request.language),
                    speaker,
                    argument.text
                ));
            }
            user.push('\n');
        }
        if let Some(instruction) = request.instruction {
            user.push_str(&format!("MODERATOR INSTRUCTION: {}\n\n", instruction));
        }
        user.push_str(&format!(
            "Deliver your {} now (max 500 characters). {}",
            request.plan.name.to_lowercase(),
            match request.language {
                Language::En => "Respond in English.",
                Language::Zh => "请用中文回答。",
            }
        ));

        Prompt::new(
            Purpose::Argument {
                side: request.side,
                round: request.plan.number,
            },
            system,
            user,
        )
        .with_max_tokens(self.config.generation.argument_max_tokens)
        .with_model(request.persona.model.clone())
    }

    /// Stream an argument, forwarding each chunk, and return the full text.
    pub async fn argue(
        &self,
        request: &ArgumentRequest<'_>,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> String {
        let prompt = self.prompt(request);
        stream_resilient(
            self.generator.as_ref(),
            &prompt,
            &self.policy,
            fallback_argument(request.side, request.language),
            on_chunk,
        )
        .await
    }
}
