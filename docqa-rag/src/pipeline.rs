//! Pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the ingestion and query workflows by
//! composing an [`EmbeddingProvider`], a [`VectorStore`], a [`Chunker`],
//! and an optional [`AnswerComposer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{RagPipeline, RagConfig, FileVectorStore, FixedSizeChunker};
//!
//! let config = RagConfig::default();
//! let pipeline = RagPipeline::builder()
//!     .chunker(Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?))
//!     .config(config)
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(FileVectorStore::open("./chroma_db")?))
//!     .build()?;
//!
//! pipeline.ingest_directory().await?;
//! let results = pipeline.retrieve("When is the dentist appointment?").await?;
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::answer::AnswerComposer;
use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::{Answer, Document, SearchResult, StoredRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::loader::{DirectoryLoader, load_file};
use crate::transform::{DocumentTransform, apply_to_file};
use crate::vectorstore::VectorStore;

/// Totals of a directory ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Number of documents ingested.
    pub documents: usize,
    /// Number of chunks stored across all documents.
    pub chunks: usize,
}

/// The pipeline orchestrator.
///
/// Coordinates ingestion (load → chunk → embed → store) and query
/// execution (embed → search → filter → answer). Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    answer_composer: Option<AnswerComposer>,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("answer_composer", &self.answer_composer)
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Create the configured collection if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the vector store error if the collection cannot be created.
    pub async fn ensure_collection(&self) -> Result<()> {
        self.vector_store.create_collection(self.collection()).await.map_err(|e| {
            error!(collection = self.collection(), error = %e, "failed to create collection");
            e
        })
    }

    /// Ingest a single document: chunk → embed → replace the source's records.
    ///
    /// Re-ingesting a document replaces all of its previous chunks, so a
    /// document that shrank leaves no stale chunks behind. Returns the
    /// records that were stored.
    ///
    /// # Errors
    ///
    /// Returns the embedding or vector store error; nothing is stored when
    /// embedding fails.
    pub async fn ingest_document(&self, document: &Document) -> Result<Vec<StoredRecord>> {
        self.ensure_collection().await?;

        // 1. Chunk the document
        let chunks = self.chunker.chunk(document);

        // 2. Generate embeddings
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(source = %document.source_id, error = %e, "embedding failed during ingestion");
            e
        })?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingError {
                provider: "pipeline".into(),
                message: format!(
                    "expected {} embeddings for '{}', got {}",
                    chunks.len(),
                    document.source_id,
                    embeddings.len()
                ),
            });
        }

        // 3. Attach embeddings to chunks
        let records: Vec<StoredRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| StoredRecord::from_chunk(chunk, vector))
            .collect();

        // 4. Replace the source's records in the vector store
        self.vector_store
            .replace_source(self.collection(), &document.source_id, &records)
            .await
            .map_err(|e| {
                error!(
                    source = %document.source_id,
                    error = %e,
                    "store write failed during ingestion"
                );
                e
            })?;

        info!(source = %document.source_id, chunk_count = records.len(), "ingested document");
        Ok(records)
    }

    /// Load and ingest every document under the configured directory.
    ///
    /// Loading is fail-fast: if any matched file cannot be read, nothing is
    /// ingested.
    ///
    /// # Errors
    ///
    /// Returns the first load, embedding or storage error.
    pub async fn ingest_directory(&self) -> Result<IngestReport> {
        let documents =
            DirectoryLoader::new(&self.config.documents_dir).with_glob(&self.config.glob).load()?;

        let mut report = IngestReport::default();
        for document in &documents {
            let records = self.ingest_document(document).await?;
            report.documents += 1;
            report.chunks += records.len();
        }

        info!(
            documents = report.documents,
            chunks = report.chunks,
            dir = %self.config.documents_dir.display(),
            "ingested directory"
        );
        Ok(report)
    }

    /// Load and ingest (or re-ingest) a single file.
    ///
    /// # Errors
    ///
    /// Returns the load, embedding or storage error.
    pub async fn ingest_path(&self, path: &Path) -> Result<Vec<StoredRecord>> {
        let document = load_file(path)?;
        self.ingest_document(&document).await
    }

    /// Apply `transforms` to the file at `path`, then re-ingest it.
    ///
    /// # Errors
    ///
    /// Returns the transform, load, embedding or storage error.
    pub async fn update_document(
        &self,
        path: &Path,
        transforms: &[&dyn DocumentTransform],
    ) -> Result<Vec<StoredRecord>> {
        if !transforms.is_empty() {
            apply_to_file(path, transforms)?;
        }
        self.ingest_path(path).await
    }

    /// Remove all records of `source`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns the vector store error.
    pub async fn delete_source(&self, source: &str) -> Result<usize> {
        let removed = self.vector_store.delete_by_source(self.collection(), source).await?;
        info!(source, removed, "deleted source");
        Ok(removed)
    }

    /// Distinct sources currently stored.
    ///
    /// # Errors
    ///
    /// Returns the vector store error.
    pub async fn sources(&self) -> Result<BTreeSet<String>> {
        self.vector_store.list_sources(self.collection()).await
    }

    /// Retrieve the chunks most similar to `query`.
    ///
    /// Returns up to `top_k` results ordered by descending score; results
    /// below the configured `similarity_threshold` are filtered out.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] without embedding the query if
    /// nothing has been ingested yet, otherwise the embedding or vector store
    /// error.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        // 0. Skip the embedding call when there is nothing to search
        if !self.vector_store.collection_exists(self.collection()).await? {
            return Err(RagError::VectorStoreError {
                backend: "pipeline".into(),
                message: format!(
                    "collection '{}' does not exist; ingest documents first",
                    self.collection()
                ),
            });
        }

        // 1. Embed the query
        let query_embedding = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        // 2. Search the vector store
        let results = self
            .vector_store
            .search(self.collection(), &query_embedding, self.config.top_k)
            .await
            .map_err(|e| {
                error!(collection = self.collection(), error = %e, "vector store search failed");
                e
            })?;

        // 3. Filter by similarity threshold; zero or below disables it
        let threshold = self.config.similarity_threshold;
        let filtered: Vec<SearchResult> = if threshold > 0.0 {
            results.into_iter().filter(|r| r.score >= threshold).collect()
        } else {
            results
        };

        info!(result_count = filtered.len(), "query completed");
        Ok(filtered)
    }

    /// Retrieve context for `question` and generate an answer from it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if no answer composer is configured,
    /// otherwise the retrieval or completion error.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let composer = self.answer_composer.as_ref().ok_or_else(|| {
            RagError::ConfigError("no answer composer configured".to_string())
        })?;

        let results = self.retrieve(question).await?;
        let context_chunks: Vec<_> = results.iter().map(|r| r.record.to_chunk()).collect();
        let answer_text = composer.answer(question, &context_chunks).await?;

        Ok(Answer { question: question.to_string(), context_chunks, answer_text })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// All fields except `answer_composer` are required. Call
/// [`build()`](RagPipelineBuilder::build) to validate and produce the pipeline.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    answer_composer: Option<AnswerComposer>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the answer composer used by [`RagPipeline::ask`].
    pub fn answer_composer(mut self, composer: AnswerComposer) -> Self {
        self.answer_composer = Some(composer);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker =
            self.chunker.ok_or_else(|| RagError::ConfigError("chunker is required".to_string()))?;

        Ok(RagPipeline {
            config,
            embedding_provider,
            vector_store,
            chunker,
            answer_composer: self.answer_composer,
        })
    }
}
