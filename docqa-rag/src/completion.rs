//! Completion provider trait for generating answer text from a prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single prompt plus its decoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    /// The full prompt text.
    pub prompt: String,
    /// Sampling temperature; `0.0` for deterministic decoding.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// A hosted language model that turns a prompt into text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate text for the request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Name of the model answering requests.
    fn model(&self) -> &str;
}
