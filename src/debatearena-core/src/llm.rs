//! Text generation backends.
//!
//! [`TextGenerator`] is the seam between the debate engine and whatever
//! produces text. [`OpenAiGenerator`] talks to any OpenAI-compatible
//! endpoint; [`MockGenerator`](crate::mock::MockGenerator) is deterministic
//! and offline. Callers never see generation failures directly:
//! [`stream_resilient`] retries with backoff and falls back to fixed text.

use std::pin::Pin;
use std::sync::LazyLock;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use regex::Regex;
use tracing::{debug, warn};

use crate::argument_scoring::Criterion;
use crate::config::GenerationConfig;
use crate::error::DebateError;
use crate::participant::Side;

/// Why a piece of text is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Argument { side: Side, round: u32 },
    Summary { side: Side, round: u32 },
    Evaluation { side: Side, round: u32 },
    RoundJudgment { judge: u8, side: Side, round: u32 },
    CriterionJudgment { judge: u8, criterion: Criterion },
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub purpose: Purpose,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    /// Overrides the backend's default model.
    pub model: Option<String>,
}

impl Prompt {
    pub fn new(purpose: Purpose, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            purpose,
            system: system.into(),
            user: user.into(),
            max_tokens: 400,
            model: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, DebateError>> + Send>>;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Stream text chunks for a prompt.
    async fn stream(&self, prompt: &Prompt) -> Result<ChunkStream, DebateError>;

    /// Whole response at once. Defaults to draining [`TextGenerator::stream`].
    async fn complete(&self, prompt: &Prompt) -> Result<String, DebateError> {
        let mut chunks = self.stream(prompt).await?;
        let mut text = String::new();
        while let Some(chunk) = chunks.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

/// Generator backed by an OpenAI-compatible chat completion API.
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(
        api_base: &str,
        api_key: &str,
        config: &GenerationConfig,
    ) -> Result<Self, DebateError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| {
                DebateError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            model: config.model.clone(),
        })
    }

    fn request(&self, prompt: &Prompt, stream: bool) -> Result<CreateChatCompletionRequest, DebateError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: prompt.system.clone().into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: prompt.user.clone().into(),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(prompt.model.as_deref().unwrap_or(&self.model))
            .max_completion_tokens(prompt.max_tokens)
            .messages(messages)
            .stream(stream)
            .build()?;
        Ok(request)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn stream(&self, prompt: &Prompt) -> Result<ChunkStream, DebateError> {
        let request = self.request(prompt, true)?;
        let responses = self.client.chat().create_stream(request).await?;

        let chunks = responses.filter_map(|item| async move {
            match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(DebateError::from(e))),
            }
        });
        Ok(Box::pin(chunks))
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, DebateError> {
        let request = self.request(prompt, false)?;
        let response = self.client.chat().create(request).await?;
        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

/// Attempt count and exponential backoff between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
        )
    }

    /// Same backoff, different attempt count.
    pub fn with_attempts(self, max_attempts: u32) -> Self {
        Self::new(max_attempts, self.backoff_base)
    }

    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base...
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Stream a prompt, forwarding every chunk to `on_chunk`, and return the full text.
///
/// Failures before any text arrives, and empty responses, are retried.
/// A failure part-way through keeps what was already delivered. When all
/// attempts are spent, `fallback` is delivered as one chunk. The returned
/// text is always the concatenation of the delivered chunks.
pub async fn stream_resilient(
    generator: &dyn TextGenerator,
    prompt: &Prompt,
    policy: &RetryPolicy,
    fallback: &str,
    on_chunk: &mut (dyn FnMut(&str) + Send),
) -> String {
    let mut text = String::new();

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay(attempt - 1)).await;
        }

        match generator.stream(prompt).await {
            Ok(mut chunks) => {
                while let Some(item) = chunks.next().await {
                    match item {
                        Ok(chunk) if chunk.is_empty() => {}
                        Ok(chunk) => {
                            on_chunk(&chunk);
                            text.push_str(&chunk);
                        }
                        Err(e) => {
                            warn!(purpose = ?prompt.purpose, attempt, error = %e, "generation stream failed");
                            break;
                        }
                    }
                }
                if !text.trim().is_empty() {
                    return text;
                }
                debug!(purpose = ?prompt.purpose, attempt, "generation produced no text");
            }
            Err(e) => {
                warn!(purpose = ?prompt.purpose, attempt, error = %e, "generation request failed");
            }
        }
    }

    warn!(purpose = ?prompt.purpose, attempts = policy.max_attempts, "generation exhausted; using fallback");
    on_chunk(fallback);
    text.push_str(fallback);
    text
}

/// Non-streaming generation with retries. Empty responses count as failures.
pub async fn complete_with_retry(
    generator: &dyn TextGenerator,
    prompt: &Prompt,
    policy: &RetryPolicy,
) -> Result<String, DebateError> {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay(attempt - 1)).await;
        }

        match generator.complete(prompt).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => {
                debug!(purpose = ?prompt.purpose, attempt, "completion was empty");
                last_error = Some(DebateError::Generation("empty response".to_string()));
            }
            Err(e) => {
                warn!(purpose = ?prompt.purpose, attempt, error = %e, "completion failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| DebateError::Generation("no attempts were made".to_string())))
}

const REASONING_TAGS: &str = "thinking|think|reflection|reflect|internal|reasoning|thought|scratchpad|scratch|plan|analysis|analyze|consider|pondering|deliberation";

static REASONING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)<(?:{tags})[^>]*>.*?</(?:{tags})>",
        tags = REASONING_TAGS
    ))
    .expect("reasoning block pattern is valid")
});
static ORPHAN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[\w]+[^>]*>").expect("orphan tag pattern is valid"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Strip reasoning blocks, stray XML-like tags and markdown emphasis from model output.
pub fn sanitize_response(response: &str) -> String {
    let result = REASONING_BLOCK.replace_all(response, "");
    let result = ORPHAN_TAG.replace_all(&result, "");
    let result = result.replace('*', "");
    WHITESPACE.replace_all(&result, " ").trim().to_string()
}
