//! Error types for the Waypoint lesson engine.
//!
//! This module defines the error hierarchy for all engine operations,
//! including configuration loading, lesson document parsing, command
//! execution, and challenge evaluation.

use std::path::PathBuf;

use waypoint_kernel::KernelError;

/// A specialized `Result` type for Waypoint engine operations.
pub type Result<T> = std::result::Result<T, WaypointError>;

/// Errors that can occur while running a lesson.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help lesson authors resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum WaypointError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your waypoint.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Lesson Document Errors
    // ========================================================================
    /// Lesson file was not found at the specified path.
    #[error("Lesson not found: '{path}'\n\nSuggestion: Check the path passed to #!start-lesson")]
    LessonNotFound {
        /// Path where the lesson was expected.
        path: PathBuf,
    },

    /// Lesson file exceeds the configured size limit.
    #[error("Lesson exceeds size limit ({limit_kb}KB): '{path}' is {size_kb}KB\n\nSuggestion: Split the lesson or raise maxDocumentSize in waypoint.json")]
    LessonTooLarge {
        /// Path to the oversized lesson.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
        /// Configured limit in kilobytes.
        limit_kb: u64,
    },

    /// Lesson file contains non-UTF-8 content.
    #[error("Lesson has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    LessonEncodingError {
        /// Path to the lesson with encoding issues.
        path: PathBuf,
    },

    /// Lesson document is malformed.
    #[error("Malformed lesson '{path}' at line {line}: {message}")]
    LessonParseError {
        /// Path to the lesson document.
        path: PathBuf,
        /// 1-indexed line the problem was detected on.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// A command sent to the kernel failed.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    // ========================================================================
    // Evaluation Errors
    // ========================================================================
    /// A challenge's grading logic failed.
    #[error("Evaluation of challenge '{challenge}' failed: {message}")]
    EvaluationError {
        /// Name of the challenge being evaluated.
        challenge: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WaypointError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `LessonNotFound` error.
    #[must_use]
    pub fn lesson_not_found(path: impl Into<PathBuf>) -> Self {
        Self::LessonNotFound { path: path.into() }
    }

    /// Creates a new `LessonTooLarge` error from byte counts.
    #[must_use]
    pub fn lesson_too_large(path: impl Into<PathBuf>, size_bytes: u64, limit_bytes: u64) -> Self {
        Self::LessonTooLarge {
            path: path.into(),
            size_kb: size_bytes / 1024,
            limit_kb: limit_bytes / 1024,
        }
    }

    /// Creates a new `LessonEncodingError`.
    #[must_use]
    pub fn lesson_encoding(path: impl Into<PathBuf>) -> Self {
        Self::LessonEncodingError { path: path.into() }
    }

    /// Creates a new `LessonParseError`.
    #[must_use]
    pub fn lesson_parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::LessonParseError {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates a new `EvaluationError`.
    #[must_use]
    pub fn evaluation(challenge: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EvaluationError {
            challenge: challenge.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error came from reading or parsing a lesson document.
    #[must_use]
    pub const fn is_document_error(&self) -> bool {
        matches!(
            self,
            Self::LessonNotFound { .. }
                | Self::LessonTooLarge { .. }
                | Self::LessonEncodingError { .. }
                | Self::LessonParseError { .. }
        )
    }
}

impl From<WaypointError> for KernelError {
    /// Kernel failures pass through unchanged; anything else surfaces as a
    /// middleware failure.
    fn from(err: WaypointError) -> Self {
        match err {
            WaypointError::Kernel(e) => e,
            other => Self::middleware(other),
        }
    }
}
