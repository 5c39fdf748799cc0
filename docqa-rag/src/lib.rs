//! Document question answering over local Markdown files.
//!
//! This crate loads documents from a directory, splits them into overlapping
//! chunks, embeds the chunks through an OpenAI-compatible API, persists them
//! in an on-disk vector store, and answers questions by retrieving the most
//! similar chunks and handing them to a completion model.
//!
//! # Ingestion
//!
//! [`DirectoryLoader`] → [`FixedSizeChunker`] → [`EmbeddingProvider`] →
//! [`VectorStore::replace_source`]
//!
//! # Query
//!
//! [`EmbeddingProvider::embed`] → [`VectorStore::search`] → [`AnswerComposer`]
//!
//! [`RagPipeline`] wires both paths together from a single [`RagConfig`].

pub mod answer;
pub mod chunking;
pub mod completion;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filestore;
pub mod loader;
pub mod openai;
pub mod pipeline;
pub mod retry;
pub mod transform;
pub mod vectorstore;

pub use answer::{AnswerComposer, build_prompt};
pub use chunking::{Chunker, FixedSizeChunker, split};
pub use completion::{CompletionProvider, CompletionRequest};
pub use config::{RagConfig, RagConfigBuilder, api_key_from_env};
pub use document::{Answer, Chunk, Document, RecordMetadata, SearchResult, StoredRecord};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use filestore::FileVectorStore;
pub use loader::{DirectoryLoader, load_file};
pub use openai::{OpenAICompletionProvider, OpenAIConfig, OpenAIEmbeddingProvider};
pub use pipeline::{IngestReport, RagPipeline, RagPipelineBuilder};
pub use retry::RetryPolicy;
pub use transform::{DocumentTransform, MoveLineToEnd, apply_to_file};
pub use vectorstore::VectorStore;
