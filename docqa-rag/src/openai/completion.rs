use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{OpenAIConfig, post_json};
use crate::completion::{CompletionProvider, CompletionRequest};
use crate::error::{RagError, Result};
use crate::retry::{RetryPolicy, with_retry};

/// The default chat model.
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// A [`CompletionProvider`] backed by the OpenAI chat completions API.
///
/// The prompt is sent as a single user message. Failed requests are not
/// retried unless a policy is set with
/// [`with_retry_policy`](Self::with_retry_policy), since a request that timed
/// out may still have been billed.
#[derive(Debug)]
pub struct OpenAICompletionProvider {
    client: reqwest::Client,
    config: OpenAIConfig,
    model: String,
    retry: RetryPolicy,
}

impl OpenAICompletionProvider {
    /// Create a new provider using `gpt-3.5-turbo`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the HTTP client cannot be built.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            config,
            model: DEFAULT_MODEL.into(),
            retry: RetryPolicy::none(),
        })
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Opt into retrying transient failures.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAICompletionProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(
            provider = "OpenAI",
            model = %self.model,
            prompt_len = request.prompt.len(),
            max_tokens = request.max_tokens,
            "requesting completion"
        );

        let url = self.config.endpoint("chat/completions");
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: &request.prompt }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response: ChatResponse = with_retry(&self.retry, "chat completion", || {
            post_json(&self.client, &self.config, &url, &body)
        })
        .await
        .map_err(|failure| {
            error!(provider = "OpenAI", error = %failure.message, "completion request failed");
            RagError::CompletionError { provider: "OpenAI".into(), message: failure.message }
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| RagError::CompletionError {
                provider: "OpenAI".into(),
                message: "API returned no answer text".into(),
            })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
