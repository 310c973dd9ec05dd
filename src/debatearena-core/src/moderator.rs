//! Moderator and organizer narration.
//!
//! Rules, introduction, judge commentary and the winner announcement are
//! fixed text. Summaries and evaluations of individual arguments are
//! generated and streamed.

use std::sync::Arc;

use crate::config::Config;
use crate::llm::{Prompt, Purpose, RetryPolicy, TextGenerator, stream_resilient};
use crate::records::Argument;
use crate::session::{Language, Winner};

/// Arguments quoted as context when evaluating.
const EVALUATION_CONTEXT: usize = 3;

pub fn organizer_rules(language: Language, rounds: u32) -> String {
    match language {
        Language::En => format!(
            "Welcome to this debate! This debate will consist of {} rounds, with each side presenting arguments in each round. Judges will score based on logic, persuasiveness, and fluency. Please respect the rules and demonstrate your best performance.",
            rounds
        ),
        Language::Zh => format!(
            "欢迎来到本场辩论！本场辩论共{}轮，双方将在每一轮中陈述论点。评委将从逻辑性、说服力和流畅度三个方面进行评分。请遵守规则，展现最佳水平。",
            rounds
        ),
    }
}

pub fn introduction(language: Language, topic: &str) -> String {
    match language {
        Language::En => format!(
            "Today's debate topic is: '{}'. Both sides will engage in a wonderful debate on this issue. Let us listen to both perspectives with an open mind and witness the clash of ideas. Now, let's begin!",
            topic
        ),
        Language::Zh => format!(
            "今天的辩题是：「{}」。正反双方将围绕这一问题展开精彩交锋。让我们以开放的心态聆听双方观点，见证思想的碰撞。现在，辩论开始！",
            topic
        ),
    }
}

pub fn judge_commentary(language: Language, judge: u8) -> String {
    match language {
        Language::En => format!(
            "Judge {}: Both debaters demonstrated excellent debate skills. Arguments were clear, logic was rigorous, and evidence was sufficient. This was an excellent debate.",
            judge
        ),
        Language::Zh => format!(
            "评委{}：双方辩手都展现了出色的辩论技巧，论点清晰，逻辑严密，论据充分。这是一场精彩的辩论。",
            judge
        ),
    }
}

pub fn winner_announcement(language: Language, winner: Winner) -> String {
    match (language, winner.side()) {
        (Language::En, Some(side)) => format!(
            "After intense debate and fair judging, the winner of this debate is: {}. Congratulations to the winner, and thank you both for the excellent performance!",
            side.label(language)
        ),
        (Language::En, None) => "After intense debate and fair judging, this debate ends in a draw. Both sides demonstrated excellent debate skills. Congratulations to both sides!".to_string(),
        (Language::Zh, Some(side)) => format!(
            "经过激烈的辩论和公正的评判，本场辩论的获胜方是：{}。恭喜获胜方，也感谢双方的精彩表现！",
            side.label(language)
        ),
        (Language::Zh, None) => "经过激烈的辩论和公正的评判，本场辩论以平局结束。双方都展现了出色的辩论技巧，恭喜双方！".to_string(),
    }
}

fn summary_fallback(language: Language) -> &'static str {
    match language {
        Language::En => "Argument received.",
        Language::Zh => "论述已接收。",
    }
}

fn evaluation_fallback(language: Language) -> &'static str {
    match language {
        Language::En => "Argument shows good logical structure.",
        Language::Zh => "论述具有良好的逻辑结构。",
    }
}

fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::En => "Respond in English.",
        Language::Zh => "请用中文回答。",
    }
}

/// Streams summaries and evaluations of arguments.
pub struct Moderator {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    summary_tokens: u32,
    evaluation_tokens: u32,
    model: String,
}

impl Moderator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self {
            generator,
            policy: RetryPolicy::from_config(&config.generation),
            summary_tokens: config.generation.summary_max_tokens,
            evaluation_tokens: config.generation.evaluation_max_tokens,
            model: config.judge_model().to_string(),
        }
    }

    /// Neutral summary of at most 200 characters.
    pub async fn summarize(
        &self,
        topic: &str,
        argument: &Argument,
        language: Language,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> String {
        let system = format!(
            "You are the debate moderator. Summarize the {} side's argument neutrally in at most 200 characters. {}",
            argument.side.label(language),
            language_instruction(language)
        );
        let user = format!("DEBATE TOPIC: {}\n\nARGUMENT:\n{}", topic, argument.text);
        let prompt = Prompt::new(
            Purpose::Summary {
                side: argument.side,
                round: argument.round,
            },
            system,
            user,
        )
        .with_max_tokens(self.summary_tokens)
        .with_model(Some(self.model.clone()));

        stream_resilient(
            self.generator.as_ref(),
            &prompt,
            &self.policy,
            summary_fallback(language),
            on_chunk,
        )
        .await
    }

    /// Brief evaluation of at most 300 characters, using the three
    /// arguments before this one as context.
    pub async fn evaluate(
        &self,
        topic: &str,
        argument: &Argument,
        earlier: &[Argument],
        language: Language,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> String {
        let system = format!(
            "You are the debate moderator. Evaluate the {} side's argument in at most 300 characters: note its strengths, weaknesses and how it engages the opponent. {}",
            argument.side.label(language),
            language_instruction(language)
        );

        let mut user = format!("DEBATE TOPIC: {}\n\n", topic);
        let context_start = earlier.len().saturating_sub(EVALUATION_CONTEXT);
        if context_start < earlier.len() {
            user.push_str("PREVIOUS ARGUMENTS:\n");
            for previous in &earlier[context_start..] {
                user.push_str(&format!(
                    "Round {} {}: {}\n",
                    previous.round,
                    previous.side.label(language),
                    previous.text
                ));
            }
            user.push('\n');
        }
        user.push_str(&format!("ARGUMENT TO EVALUATE:\n{}", argument.text));

        let prompt = Prompt::new(
            Purpose::Evaluation {
                side: argument.side,
                round: argument.round,
            },
            system,
            user,
        )
        .with_max_tokens(self.evaluation_tokens)
        .with_model(Some(self.model.clone()));

        stream_resilient(
            self.generator.as_ref(),
            &prompt,
            &self.policy,
            evaluation_fallback(language),
            on_chunk,
        )
        .await
    }
}
