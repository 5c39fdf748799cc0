//! On-disk vector store using cosine similarity.
//!
//! [`FileVectorStore`] keeps one JSON file per collection inside a store
//! directory. Records are kept in insertion order, which is also the
//! tie-breaking order for equal search scores.
//!
//! Writes are atomic: the new collection is written to a `.tmp` sibling,
//! synced, and renamed over the live file, so a failed write leaves the
//! previous state intact. Mutations also take an advisory lock on
//! `{store_dir}/.lock`; if another process holds it the operation fails
//! immediately instead of waiting.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::document::{SearchResult, StoredRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, cosine_similarity};

const BACKEND: &str = "File";
const FORMAT_VERSION: u32 = 1;
const LOCK_FILE: &str = ".lock";

fn storage_error(message: impl Into<String>) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message: message.into() }
}

/// Serialized form of one collection.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    version: u32,
    /// Vector length fixed by the first write.
    dimensions: Option<usize>,
    records: Vec<StoredRecord>,
}

impl CollectionFile {
    fn empty() -> Self {
        Self { version: FORMAT_VERSION, dimensions: None, records: Vec::new() }
    }

    /// Fix the vector length on first use; an emptied collection accepts a new one.
    fn check_dimensions(&mut self, records: &[StoredRecord]) -> Result<()> {
        if self.records.is_empty() {
            self.dimensions = None;
        }
        for record in records {
            let len = record.vector.len();
            if len == 0 {
                return Err(RagError::ConfigError(format!("record '{}' has no vector", record.id)));
            }
            match self.dimensions {
                Some(expected) if expected != len => {
                    return Err(RagError::ConfigError(format!(
                        "embedding dimension mismatch for '{}': \
                         collection stores {expected}, got {len}",
                        record.id
                    )));
                }
                Some(_) => {}
                None => self.dimensions = Some(len),
            }
        }
        Ok(())
    }

    /// Replace records with matching ids in place, append the rest.
    fn upsert(&mut self, records: &[StoredRecord]) {
        let mut positions: HashMap<String, usize> =
            self.records.iter().enumerate().map(|(i, r)| (r.id.clone(), i)).collect();
        for record in records {
            match positions.get(&record.id) {
                Some(&pos) => self.records[pos] = record.clone(),
                None => {
                    positions.insert(record.id.clone(), self.records.len());
                    self.records.push(record.clone());
                }
            }
        }
    }

    fn remove_source(&mut self, source: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.metadata.source != source);
        before - self.records.len()
    }
}

/// A vector store persisted as JSON files in a directory.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::open("./chroma_db")?;
/// store.create_collection("documents").await?;
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    root: PathBuf,
    /// Serializes writers within this process; the lock file covers other processes.
    writer: Mutex<()>,
}

impl FileVectorStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| storage_error(format!("cannot create {}: {e}", root.display())))?;
        Ok(Self { root, writer: Mutex::new(()) })
    }

    /// The store directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of records in a collection, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if the collection cannot be read.
    pub fn record_count(&self, collection: &str) -> Result<Option<usize>> {
        Ok(self.read_collection(collection)?.map(|c| c.records.len()))
    }

    fn collection_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(RagError::ConfigError(format!("invalid collection name '{name}'")));
        }
        Ok(self.root.join(format!("{name}.json")))
    }

    fn read_collection(&self, name: &str) -> Result<Option<CollectionFile>> {
        let path = self.collection_path(name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(format!("cannot read {}: {e}", path.display()))),
        };
        let file: CollectionFile = serde_json::from_slice(&bytes)
            .map_err(|e| storage_error(format!("corrupt collection {}: {e}", path.display())))?;
        if file.version != FORMAT_VERSION {
            return Err(storage_error(format!(
                "{} has unsupported format version {}",
                path.display(),
                file.version
            )));
        }
        Ok(Some(file))
    }

    fn write_collection(&self, name: &str, file: &CollectionFile) -> Result<()> {
        let path = self.collection_path(name)?;
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec(file)
            .map_err(|e| storage_error(format!("cannot serialize collection '{name}': {e}")))?;

        let write = || -> std::io::Result<()> {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&json)?;
            tmp.sync_all()?;
            fs::rename(&tmp_path, &path)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            storage_error(format!("cannot write {}: {e}", path.display()))
        })
    }

    /// Run `f` while holding the store's advisory lock file.
    fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock_path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| storage_error(format!("cannot open {}: {e}", lock_path.display())))?;
        let mut lock = fd_lock::RwLock::new(file);
        let _guard = lock.try_write().map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                storage_error(format!("{} is locked by another process", self.root.display()))
            } else {
                storage_error(format!("cannot lock {}: {e}", lock_path.display()))
            }
        })?;
        f()
    }

    /// Load an existing collection, apply `f`, and write the result atomically.
    async fn mutate<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut CollectionFile) -> Result<T>,
    ) -> Result<T> {
        let _writer = self.writer.lock().await;
        self.with_lock(|| {
            let mut file = self.read_collection(collection)?.ok_or_else(|| {
                storage_error(format!("collection '{collection}' does not exist"))
            })?;
            let value = f(&mut file)?;
            self.write_collection(collection, &file)?;
            Ok(value)
        })
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn create_collection(&self, name: &str) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.with_lock(|| {
            if self.read_collection(name)?.is_none() {
                self.write_collection(name, &CollectionFile::empty())?;
                debug!(collection = name, "created collection");
            }
            Ok(())
        })
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collection_path(name)?.is_file())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let path = self.collection_path(name)?;
        let _writer = self.writer.lock().await;
        self.with_lock(|| match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(format!("cannot remove {}: {e}", path.display()))),
        })
    }

    async fn upsert(&self, collection: &str, records: &[StoredRecord]) -> Result<()> {
        self.mutate(collection, |file| {
            file.check_dimensions(records)?;
            file.upsert(records);
            Ok(())
        })
        .await?;
        debug!(collection, record_count = records.len(), "upserted records");
        Ok(())
    }

    async fn replace_source(
        &self,
        collection: &str,
        source: &str,
        records: &[StoredRecord],
    ) -> Result<()> {
        if let Some(stray) = records.iter().find(|r| r.metadata.source != source) {
            return Err(RagError::ConfigError(format!(
                "record '{}' does not belong to source '{source}'",
                stray.id
            )));
        }
        let removed = self
            .mutate(collection, |file| {
                let removed = file.remove_source(source);
                file.check_dimensions(records)?;
                file.upsert(records);
                Ok(removed)
            })
            .await?;
        debug!(collection, source, removed, inserted = records.len(), "replaced source");
        Ok(())
    }

    async fn delete_by_source(&self, collection: &str, source: &str) -> Result<usize> {
        if self.read_collection(collection)?.is_none() {
            return Ok(0);
        }
        let removed = self.mutate(collection, |file| Ok(file.remove_source(source))).await?;
        debug!(collection, source, removed, "deleted source");
        Ok(removed)
    }

    async fn list_sources(&self, collection: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .read_collection(collection)?
            .map(|file| file.records.into_iter().map(|r| r.metadata.source).collect())
            .unwrap_or_default())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        let file = self
            .read_collection(collection)?
            .ok_or_else(|| storage_error(format!("collection '{collection}' does not exist")))?;
        if let Some(expected) = file.dimensions.filter(|_| !file.records.is_empty()) {
            if expected != embedding.len() {
                return Err(RagError::ConfigError(format!(
                    "query embedding has {} dimensions, collection '{collection}' stores \
                     {expected}",
                    embedding.len()
                )));
            }
        }

        let mut scored: Vec<SearchResult> = file
            .records
            .into_iter()
            .map(|record| {
                let score = cosine_similarity(&record.vector, embedding);
                // `+ 0.0` folds -0.0 into 0.0 so signed zeros tie.
                let score = if score.is_nan() { f32::NEG_INFINITY } else { score + 0.0 };
                SearchResult { record, score }
            })
            .collect();

        // Stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RecordMetadata;

    fn record(source: &str, index: usize, vector: Vec<f32>) -> StoredRecord {
        StoredRecord {
            id: crate::document::record_id(source, index),
            vector,
            text: format!("{source} chunk {index}"),
            metadata: RecordMetadata { source: source.to_string(), chunk_index: index },
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.create_collection("docs").await.unwrap();

        let r = record("a.md", 0, vec![1.0, 0.0]);
        store.upsert("docs", &[r.clone()]).await.unwrap();
        store.upsert("docs", &[r]).await.unwrap();

        assert_eq!(store.record_count("docs").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileVectorStore::open(dir.path()).unwrap();
            store.create_collection("docs").await.unwrap();
            store.upsert("docs", &[record("a.md", 0, vec![1.0, 0.0])]).await.unwrap();
        }

        let store = FileVectorStore::open(dir.path()).unwrap();
        let results = store.search("docs", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.metadata.source, "a.md");
        assert!(!dir.path().join("docs.json.tmp").exists());
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.create_collection("docs").await.unwrap();
        let records: Vec<_> = (0..4).map(|i| record("a.md", i, vec![1.0, 1.0])).collect();
        store.upsert("docs", &records).await.unwrap();

        let results = store.search("docs", &[2.0, 2.0], 3).await.unwrap();
        let indexes: Vec<_> = results.iter().map(|r| r.record.metadata.chunk_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn zero_scores_of_either_sign_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.create_collection("docs").await.unwrap();
        store.upsert("docs", &[record("first.md", 0, vec![-1.0, 0.0])]).await.unwrap();
        store.upsert("docs", &[record("second.md", 0, vec![1.0, 0.0])]).await.unwrap();

        let results = store.search("docs", &[0.0, -1.0], 2).await.unwrap();
        let sources: Vec<_> =
            results.iter().map(|r| r.record.metadata.source.as_str()).collect();
        assert_eq!(sources, vec!["first.md", "second.md"]);
        assert!(results.iter().all(|r| r.score.to_bits() == 0.0f32.to_bits()));
    }

    #[tokio::test]
    async fn emptied_collection_accepts_new_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.create_collection("docs").await.unwrap();
        store.upsert("docs", &[record("a.md", 0, vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.delete_by_source("docs", "a.md").await.unwrap(), 1);
        assert_eq!(store.record_count("docs").unwrap(), Some(0));

        let wider = record("a.md", 0, vec![1.0, 0.0, 0.0]);
        store.replace_source("docs", "a.md", &[wider]).await.unwrap();
        let results = store.search("docs", &[1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn replacing_the_only_source_may_change_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.create_collection("docs").await.unwrap();
        store.upsert("docs", &[record("a.md", 0, vec![1.0, 0.0])]).await.unwrap();

        let wider = record("a.md", 0, vec![0.0, 0.0, 1.0]);
        store.replace_source("docs", "a.md", &[wider]).await.unwrap();
        assert_eq!(store.record_count("docs").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn zero_top_k_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.create_collection("docs").await.unwrap();
        let err = store.search("docs", &[1.0], 0).await.unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.create_collection("docs").await.unwrap();
        store.upsert("docs", &[record("a.md", 0, vec![1.0, 0.0])]).await.unwrap();

        let err = store.upsert("docs", &[record("b.md", 0, vec![1.0, 0.0, 0.0])]).await;
        assert!(matches!(err, Err(RagError::ConfigError(_))));
        let err = store.search("docs", &[1.0], 1).await;
        assert!(matches!(err, Err(RagError::ConfigError(_))));
        assert_eq!(store.record_count("docs").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn replace_source_drops_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.create_collection("docs").await.unwrap();
        let old: Vec<_> = (0..3).map(|i| record("a.md", i, vec![1.0, 0.0])).collect();
        store.upsert("docs", &old).await.unwrap();
        store.upsert("docs", &[record("b.md", 0, vec![0.0, 1.0])]).await.unwrap();

        store.replace_source("docs", "a.md", &[record("a.md", 0, vec![0.5, 0.5])]).await.unwrap();

        assert_eq!(store.record_count("docs").unwrap(), Some(2));
        let sources = store.list_sources("docs").await.unwrap();
        assert_eq!(sources.into_iter().collect::<Vec<_>>(), vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn delete_by_source_is_a_no_op_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        assert_eq!(store.delete_by_source("docs", "a.md").await.unwrap(), 0);
        store.create_collection("docs").await.unwrap();
        assert_eq!(store.delete_by_source("docs", "a.md").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_collection_search_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        let err = store.search("docs", &[1.0], 1).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStoreError { .. }));
        assert!(store.list_sources("docs").await.unwrap().is_empty());
        assert!(!store.collection_exists("docs").await.unwrap());
        store.create_collection("docs").await.unwrap();
        assert!(store.collection_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn held_lock_fails_writers_fast() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.create_collection("docs").await.unwrap();

        let other = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(dir.path().join(LOCK_FILE))
            .unwrap();
        let mut other = fd_lock::RwLock::new(other);
        let _held = other.write().unwrap();

        let err = store.upsert("docs", &[record("a.md", 0, vec![1.0])]).await.unwrap_err();
        assert!(err.to_string().contains("locked by another process"));
    }

    #[tokio::test]
    async fn invalid_collection_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.create_collection("../escape").await,
            Err(RagError::ConfigError(_))
        ));
        assert!(matches!(store.create_collection(".lock").await, Err(RagError::ConfigError(_))));
    }
}
