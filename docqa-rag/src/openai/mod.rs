//! OpenAI-compatible HTTP providers.
//!
//! - [`OpenAIEmbeddingProvider`] calls `/v1/embeddings`
//! - [`OpenAICompletionProvider`] calls `/v1/chat/completions`
//!
//! Both share an [`OpenAIConfig`] holding the credential, the base URL and
//! the per-request timeout. The credential never appears in `Debug` output
//! or log events.

mod completion;
mod embedding;

pub use completion::OpenAICompletionProvider;
pub use embedding::OpenAIEmbeddingProvider;

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{API_BASE_ENV, DEFAULT_API_BASE, api_key_from_env};
use crate::error::{RagError, Result};
use crate::retry::RequestFailure;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings shared by the OpenAI providers.
#[derive(Clone)]
pub struct OpenAIConfig {
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAIConfig {
    /// Create a config for the public OpenAI API.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is blank.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("API key must not be empty".into()));
        }
        Ok(Self { api_key, api_base: DEFAULT_API_BASE.to_string(), timeout: DEFAULT_TIMEOUT })
    }

    /// Create a config from `OPENAI_API_KEY`, honouring `OPENAI_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is not set.
    pub fn from_env() -> Result<Self> {
        let config = Self::new(api_key_from_env()?)?;
        Ok(match std::env::var(API_BASE_ENV) {
            Ok(base) if !base.trim().is_empty() => config.with_api_base(base),
            _ => config,
        })
    }

    /// Point the providers at another OpenAI-compatible server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// The configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full URL for an API path such as `embeddings`.
    ///
    /// A base URL that already ends in a version segment (`/v1`) is used as-is.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        if has_version_suffix(&self.api_base) {
            format!("{}/{path}", self.api_base)
        } else {
            format!("{}/v1/{path}", self.api_base)
        }
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))
    }
}

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// POST a JSON body and decode a JSON response, classifying failures for retry.
async fn post_json<Req, Resp>(
    client: &reqwest::Client,
    config: &OpenAIConfig,
    url: &str,
    body: &Req,
) -> std::result::Result<Resp, RequestFailure>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let response =
        client.post(url).bearer_auth(&config.api_key).json(body).send().await.map_err(|e| {
            let message = format!("request failed: {e}");
            if e.is_timeout() || e.is_connect() || e.is_request() {
                RequestFailure::transient(message)
            } else {
                RequestFailure::permanent(message)
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
        let message = format!("API returned {status}: {detail}");
        return Err(if status.as_u16() == 429 || status.is_server_error() {
            RequestFailure::transient(message)
        } else {
            RequestFailure::permanent(message)
        });
    }

    response
        .json::<Resp>()
        .await
        .map_err(|e| RequestFailure::permanent(format!("failed to parse response: {e}")))
}
