//! Pre-ingestion text transforms.
//!
//! A [`DocumentTransform`] edits a document's text before it is re-ingested.
//! [`apply_to_file`] runs a list of transforms over a file on disk and writes
//! the result back atomically.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{RagError, Result};

/// An edit applied to document text before ingestion.
pub trait DocumentTransform: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Return the transformed text. Must return the input unchanged when
    /// there is nothing to do.
    fn apply(&self, text: &str) -> String;
}

/// Moves every line containing a needle to the end of the text.
///
/// Moved lines keep their relative order; all other lines are untouched.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{DocumentTransform, MoveLineToEnd};
///
/// let transform = MoveLineToEnd::new("Dentist")?;
/// assert_eq!(transform.apply("- Dentist\n# Wednesday\n"), "# Wednesday\n- Dentist\n");
/// ```
#[derive(Debug, Clone)]
pub struct MoveLineToEnd {
    needle: String,
}

impl MoveLineToEnd {
    /// Create a transform moving lines that contain `needle`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `needle` is empty.
    pub fn new(needle: impl Into<String>) -> Result<Self> {
        let needle = needle.into();
        if needle.is_empty() {
            return Err(RagError::ConfigError("line needle must not be empty".into()));
        }
        Ok(Self { needle })
    }
}

impl DocumentTransform for MoveLineToEnd {
    fn name(&self) -> &str {
        "move-line-to-end"
    }

    fn apply(&self, text: &str) -> String {
        let (moved, kept): (Vec<&str>, Vec<&str>) =
            text.split_inclusive('\n').partition(|line| line.contains(self.needle.as_str()));
        if moved.is_empty() {
            return text.to_string();
        }

        let lines: Vec<&str> = kept
            .into_iter()
            .chain(moved)
            .map(|line| line.strip_suffix('\n').unwrap_or(line))
            .collect();
        let mut out = lines.join("\n");
        if text.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// Apply `transforms` in order to the file at `path`.
///
/// The file is rewritten only if the text changed, via a synced
/// `{name}.tmp` sibling renamed over it. Returns whether it was rewritten.
///
/// # Errors
///
/// Returns [`RagError::LoadError`] if the file cannot be read or written.
pub fn apply_to_file(path: &Path, transforms: &[&dyn DocumentTransform]) -> Result<bool> {
    let path_str = path.display().to_string();
    let original =
        fs::read_to_string(path).map_err(|e| RagError::load(path_str.clone(), e.to_string()))?;

    let mut text = original.clone();
    for transform in transforms {
        let next = transform.apply(&text);
        if next != text {
            info!(path = %path_str, transform = transform.name(), "transformed document");
        }
        text = next;
    }
    if text == original {
        return Ok(false);
    }

    let tmp_path = staging_path(path);
    let write = || -> std::io::Result<()> {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(text.as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, path)
    };
    write().map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        RagError::load(path_str, format!("cannot write transformed text: {e}"))
    })?;
    Ok(true)
}

/// `notes.md` stages as `notes.md.tmp`, never clobbering a sibling `notes.tmp`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
