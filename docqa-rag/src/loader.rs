//! Loading documents from the filesystem.

use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::debug;
use walkdir::WalkDir;

use crate::document::{Document, source_id_for};
use crate::error::{RagError, Result};

/// Glob matching every file.
pub const MATCH_ALL: &str = "**/*";

/// Loads every file under a directory whose relative path matches a glob.
///
/// Loading is fail-fast: if any matched file cannot be read or is not valid
/// UTF-8, [`load`](Self::load) returns that error and no documents.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::DirectoryLoader;
///
/// let documents = DirectoryLoader::new("./documents").with_glob("**/*.md").load()?;
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    glob: String,
}

impl DirectoryLoader {
    /// Create a loader matching every file under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), glob: MATCH_ALL.to_string() }
    }

    /// Restrict loading to paths (relative to the root) matching `pattern`.
    pub fn with_glob(mut self, pattern: impl Into<String>) -> Self {
        self.glob = pattern.into();
        self
    }

    /// Return the paths that [`load`](Self::load) would read, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::LoadError`] if the root is missing or not a
    /// directory, the glob is invalid, or the directory cannot be walked.
    pub fn matching_paths(&self) -> Result<Vec<PathBuf>> {
        let root_display = self.root.display().to_string();
        if !self.root.exists() {
            return Err(RagError::load(root_display, "directory does not exist"));
        }
        if !self.root.is_dir() {
            return Err(RagError::load(root_display, "not a directory"));
        }
        let pattern = Pattern::new(&self.glob).map_err(|e| {
            RagError::load(root_display.clone(), format!("invalid glob '{}': {e}", self.glob))
        })?;

        let mut paths = Vec::new();
        // Symlinked files and directories are followed; a link cycle is a load error.
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| RagError::load(root_display.clone(), e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if pattern.matches_path(relative) {
                paths.push(entry.into_path());
            }
        }

        paths.sort();
        Ok(paths)
    }

    /// Load every matching file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::LoadError`] on the first path that fails.
    pub fn load(&self) -> Result<Vec<Document>> {
        let paths = self.matching_paths()?;
        debug!(
            root = %self.root.display(),
            glob = %self.glob,
            file_count = paths.len(),
            "loading documents"
        );
        paths.iter().map(|path| load_file(path)).collect()
    }
}

/// Load a single file as a [`Document`].
///
/// # Errors
///
/// Returns [`RagError::LoadError`] if the file cannot be read or is not UTF-8.
pub fn load_file(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| RagError::load(path.display().to_string(), e.to_string()))?;
    Ok(Document::new(source_id_for(path), text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_only_matching_files_recursively() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("a.md"), "# A").unwrap();
        fs::write(root.join("nested/b.md"), "# B").unwrap();
        fs::write(root.join("notes.txt"), "ignore").unwrap();

        let documents = DirectoryLoader::new(root).with_glob("**/*.md").load().unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].text, "# A");
        assert!(documents[1].source_id.ends_with("b.md"));
    }

    #[test]
    fn default_glob_matches_everything() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.md"), "a").unwrap();
        fs::write(temp.path().join("b.txt"), "b").unwrap();

        let documents = DirectoryLoader::new(temp.path()).load().unwrap();
        assert_eq!(documents.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_documents_are_loaded() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("notes");
        let elsewhere = temp.path().join("elsewhere");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&elsewhere).unwrap();
        fs::write(elsewhere.join("real.md"), "linked").unwrap();
        std::os::unix::fs::symlink(elsewhere.join("real.md"), root.join("link.md")).unwrap();

        let documents = DirectoryLoader::new(&root).with_glob("*.md").load().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].text, "linked");
        assert!(documents[0].source_id.ends_with("notes/link.md"));
    }

    #[test]
    fn missing_directory_is_a_load_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = DirectoryLoader::new(temp.path().join("missing")).load().unwrap_err();
        assert!(matches!(err, RagError::LoadError { .. }));
    }

    #[test]
    fn invalid_utf8_fails_the_whole_load() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.md"), "fine").unwrap();
        fs::write(temp.path().join("b.md"), [0xffu8, 0xfe, 0x00]).unwrap();

        let err = DirectoryLoader::new(temp.path()).with_glob("*.md").load().unwrap_err();
        match err {
            RagError::LoadError { path, .. } => assert!(path.ends_with("b.md")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_file_uses_path_as_source() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("appointments.md");
        fs::write(&path, "The dentist appointment is Monday at 9am.").unwrap();

        let document = load_file(&path).unwrap();
        assert_eq!(document.source_id, path.to_string_lossy());
    }
}
