//! Error types for the `docqa-rag` crate.

use thiserror::Error;

/// Errors that can occur while loading, indexing or querying documents.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad or missing configuration, or an invalid parameter.
    ///
    /// Never retried.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A document directory or file could not be read.
    #[error("Load error ({path}): {message}")]
    LoadError {
        /// The path that failed to load.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The completion service failed to produce an answer.
    #[error("Completion error ({provider}): {message}")]
    CompletionError {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    pub(crate) fn load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LoadError { path: path.into(), message: message.into() }
    }

    /// Returns `true` for failures of an external HTTP service.
    pub fn is_service_error(&self) -> bool {
        matches!(self, Self::EmbeddingError { .. } | Self::CompletionError { .. })
    }
}

/// A convenience result type for docqa operations.
pub type Result<T> = std::result::Result<T, RagError>;
