//! Answer composition: prompt assembly plus a completion call.

use std::sync::Arc;

use tracing::{error, info};

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::document::Chunk;
use crate::error::Result;

/// Default upper bound on answer length.
pub const DEFAULT_MAX_TOKENS: u32 = 256;

const INSTRUCTIONS: &str = "Use the following pieces of context to answer the question at the end. \
If the context does not contain the answer, say that you don't know instead of making one up.";

/// Builds a prompt from retrieved chunks and asks a [`CompletionProvider`].
///
/// Decoding is deterministic (temperature 0) with a bounded output length.
pub struct AnswerComposer {
    provider: Arc<dyn CompletionProvider>,
    max_tokens: u32,
}

impl std::fmt::Debug for AnswerComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerComposer")
            .field("model", &self.provider.model())
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnswerComposer {
    /// Create a composer with the default token limit.
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider, max_tokens: DEFAULT_MAX_TOKENS }
    }

    /// Set the maximum answer length in tokens. Zero is treated as one.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    /// Answer `question` from `context_chunks`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CompletionError`](crate::RagError::CompletionError)
    /// if the completion service fails. The call is not retried here.
    pub async fn answer(&self, question: &str, context_chunks: &[Chunk]) -> Result<String> {
        let request = CompletionRequest {
            prompt: build_prompt(question, context_chunks),
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };

        let answer = self.provider.complete(&request).await.map_err(|e| {
            error!(model = self.provider.model(), error = %e, "answer generation failed");
            e
        })?;
        info!(
            model = self.provider.model(),
            context_chunks = context_chunks.len(),
            answer_len = answer.len(),
            "answer generated"
        );
        Ok(answer)
    }
}

/// Assemble the prompt: instructions, source-attributed chunks, then the question.
pub fn build_prompt(question: &str, context_chunks: &[Chunk]) -> String {
    let context = context_chunks
        .iter()
        .map(|chunk| format!("[source: {}]\n{}", chunk.source_id, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{INSTRUCTIONS}\n\n{context}\n\nQuestion: {question}\nAnswer:")
}
