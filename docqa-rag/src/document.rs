//! Data types for documents, chunks, stored records and answers.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A loaded source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Stable key of the document, derived from its file path.
    pub source_id: String,
    /// The full text content of the document.
    pub text: String,
}

impl Document {
    /// Create a document from a source identifier and its text.
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source_id: source_id.into(), text: text.into() }
    }
}

/// A bounded slice of a [`Document`], the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// The source identifier of the parent [`Document`].
    pub source_id: String,
    /// Position of the chunk within its document, starting at 0.
    pub chunk_index: usize,
}

impl Chunk {
    /// The record id this chunk is stored under.
    pub fn record_id(&self) -> String {
        record_id(&self.source_id, self.chunk_index)
    }
}

/// Metadata persisted alongside every stored vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Source identifier of the document the record came from.
    pub source: String,
    /// Index of the chunk within that document.
    pub chunk_index: usize,
}

/// A chunk together with its embedding, as persisted by a vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    /// Unique id, `{source}#{chunk_index}`.
    pub id: String,
    /// The embedding of [`text`](Self::text).
    pub vector: Vec<f32>,
    /// The chunk text.
    pub text: String,
    /// Source and position of the chunk.
    pub metadata: RecordMetadata,
}

impl StoredRecord {
    /// Build a record from a chunk and its embedding.
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.record_id(),
            vector,
            text: chunk.text,
            metadata: RecordMetadata { source: chunk.source_id, chunk_index: chunk.chunk_index },
        }
    }

    /// Convert the record back into the [`Chunk`] it was built from.
    pub fn to_chunk(&self) -> Chunk {
        Chunk {
            text: self.text.clone(),
            source_id: self.metadata.source.clone(),
            chunk_index: self.metadata.chunk_index,
        }
    }
}

/// A retrieved [`StoredRecord`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved record.
    pub record: StoredRecord,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// The outcome of a question: the context that was retrieved and the
/// generated answer. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    /// The question as asked.
    pub question: String,
    /// The chunks handed to the completion model.
    pub context_chunks: Vec<Chunk>,
    /// The generated answer text.
    pub answer_text: String,
}

/// Build the record id for a chunk of `source`.
pub fn record_id(source: &str, chunk_index: usize) -> String {
    format!("{source}#{chunk_index}")
}

/// Derive a source identifier from a file path.
///
/// Leading and interior `.` components are dropped so that `./documents/a.md`
/// and `documents/a.md` map to the same source.
pub fn source_id_for(path: &Path) -> String {
    let normalized: PathBuf =
        path.components().filter(|c| !matches!(c, Component::CurDir)).collect();
    normalized.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_strips_current_dir() {
        assert_eq!(source_id_for(Path::new("./documents/a.md")), "documents/a.md");
        assert_eq!(source_id_for(Path::new("documents/./a.md")), "documents/a.md");
        assert_eq!(source_id_for(Path::new("documents/a.md")), "documents/a.md");
    }

    #[test]
    fn record_round_trips_chunk() {
        let chunk =
            Chunk { text: "hello".into(), source_id: "documents/a.md".into(), chunk_index: 3 };
        let record = StoredRecord::from_chunk(chunk.clone(), vec![0.5, 0.5]);
        assert_eq!(record.id, "documents/a.md#3");
        assert_eq!(record.metadata.source, "documents/a.md");
        assert_eq!(record.to_chunk(), chunk);
    }
}
