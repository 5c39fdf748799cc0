//! Vector store trait for storing and searching vector embeddings.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::document::{SearchResult, StoredRecord};
use crate::error::Result;

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of [`StoredRecord`]s keyed by
/// record id and support upserting, deleting by source, and searching by
/// vector similarity. Every mutating call is all-or-nothing.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::open("./chroma_db")?;
/// store.create_collection("documents").await?;
/// store.upsert("documents", &records).await?;
/// let results = store.search("documents", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str) -> Result<()>;

    /// Whether a named collection exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert records, replacing any existing record with the same id.
    async fn upsert(&self, collection: &str, records: &[StoredRecord]) -> Result<()>;

    /// Remove every record of `source`, then insert `records`, as one write.
    async fn replace_source(
        &self,
        collection: &str,
        source: &str,
        records: &[StoredRecord],
    ) -> Result<()>;

    /// Remove every record whose metadata source equals `source`.
    ///
    /// Returns the number of records removed; zero is not an error.
    async fn delete_by_source(&self, collection: &str, source: &str) -> Result<usize>;

    /// Distinct sources across all records of the collection.
    async fn list_sources(&self, collection: &str) -> Result<BTreeSet<String>>;

    /// Search for the `top_k` most similar records to the given embedding.
    ///
    /// Returns results ordered by descending similarity score; equal scores
    /// keep insertion order. `top_k == 0` is a configuration error.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
