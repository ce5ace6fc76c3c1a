//! Lesson document loading.
//!
//! A [`LessonDocument`] is the raw text of a lesson file, checked for
//! existence, size and encoding before any parsing happens.

use std::path::{Path, PathBuf};

use crate::error::{Result, WaypointError};

/// Raw, validated contents of a lesson file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonDocument {
    /// Path the document was read from.
    pub path: PathBuf,

    /// Document text.
    pub content: String,

    /// Size of the document in bytes.
    pub size_bytes: u64,
}

impl LessonDocument {
    /// Loads a lesson document, rejecting files larger than `max_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `WaypointError::LessonNotFound` if the file doesn't exist.
    /// Returns `WaypointError::LessonTooLarge` if the file exceeds `max_size`.
    /// Returns `WaypointError::LessonEncodingError` if the file is not valid UTF-8.
    pub fn load(path: impl AsRef<Path>, max_size: u64) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WaypointError::lesson_not_found(path)
            } else {
                WaypointError::Io(e)
            }
        })?;

        if metadata.is_dir() {
            return Err(WaypointError::lesson_not_found(path));
        }

        let size_bytes = metadata.len();
        if size_bytes > max_size {
            return Err(WaypointError::lesson_too_large(path, size_bytes, max_size));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                WaypointError::lesson_encoding(path)
            } else {
                WaypointError::Io(e)
            }
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            content,
            size_bytes,
        })
    }

    /// Wraps in-memory text as a document attributed to `path`.
    #[must_use]
    pub fn from_source(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size_bytes: u64::try_from(content.len()).unwrap_or(u64::MAX),
            content,
        }
    }

    /// File name without extension, used as the fallback lesson name.
    #[must_use]
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
