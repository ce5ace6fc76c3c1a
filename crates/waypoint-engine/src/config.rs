//! Configuration types for the Waypoint lesson engine.
//!
//! Settings are read from `waypoint.json`. A missing file means defaults;
//! a present but malformed file is an error.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaypointError};
use crate::lesson::LessonMode;
use crate::render::RenderFormat;

/// The default config file name.
const CONFIG_FILE_NAME: &str = "waypoint.json";

/// Default maximum lesson document size in bytes (100KB).
pub const DEFAULT_MAX_DOCUMENT_SIZE: u64 = 100 * 1024;

/// Default name the lesson is bound under in the execution environment.
fn default_lesson_variable() -> String {
    "Lesson".to_string()
}

/// Default language for code blocks without an info string.
fn default_language() -> String {
    "rust".to_string()
}

const fn default_max_document_size() -> u64 {
    DEFAULT_MAX_DOCUMENT_SIZE
}

/// Main configuration for a lesson session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Whether resets discard (teacher) or preserve (student) challenge state.
    #[serde(default)]
    pub mode: LessonMode,

    /// Name the lesson state is bound under in the execution environment.
    #[serde(default = "default_lesson_variable")]
    pub lesson_variable: String,

    /// Reference directives submitted during bootstrap, before the lesson
    /// variable is bound.
    #[serde(default)]
    pub references: Vec<String>,

    /// Language assigned to content code blocks that do not name one.
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Maximum accepted lesson document size in bytes.
    #[serde(default = "default_max_document_size")]
    pub max_document_size: u64,

    /// How evaluation results are rendered for display.
    #[serde(default)]
    pub render_format: RenderFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: LessonMode::default(),
            lesson_variable: default_lesson_variable(),
            references: Vec::new(),
            default_language: default_language(),
            max_document_size: default_max_document_size(),
            render_format: RenderFormat::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `waypoint.json` in the current directory. If not found,
    /// returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            WaypointError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `waypoint.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `WaypointError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `WaypointError::ConfigValidationError` if the configuration values
    /// are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(WaypointError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| WaypointError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// - `lessonVariable` must be a valid identifier
    /// - `defaultLanguage` must not be empty
    /// - `maxDocumentSize` must be greater than 0
    /// - `references` must not contain blank entries
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.lesson_variable) {
            return Err(WaypointError::config_validation(
                format!(
                    "lessonVariable '{}' is not a valid identifier",
                    self.lesson_variable
                ),
                "Use letters, digits and underscores, starting with a letter (e.g. \"Lesson\")",
            ));
        }

        if self.default_language.trim().is_empty() {
            return Err(WaypointError::config_validation(
                "defaultLanguage must not be empty",
                "Set defaultLanguage to the language of your lesson's code cells",
            ));
        }

        if self.max_document_size == 0 {
            return Err(WaypointError::config_validation(
                "maxDocumentSize must be greater than 0",
                "Remove maxDocumentSize to use the 100KB default",
            ));
        }

        if self.references.iter().any(|r| r.trim().is_empty()) {
            return Err(WaypointError::config_validation(
                "references must not contain empty entries",
                "Remove the empty strings from references in your waypoint.json",
            ));
        }

        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mode, LessonMode::Teacher);
        assert_eq!(config.lesson_variable, "Lesson");
        assert!(config.references.is_empty());
        assert_eq!(config.default_language, "rust");
        assert_eq!(config.max_document_size, 102_400);
        assert_eq!(config.render_format, RenderFormat::Markdown);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r##"{
            "mode": "Student",
            "lessonVariable": "Course",
            "references": ["#!use tutor"],
            "defaultLanguage": "python",
            "maxDocumentSize": 2048,
            "renderFormat": "html"
        }"##;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, LessonMode::Student);
        assert_eq!(config.lesson_variable, "Course");
        assert_eq!(config.references, vec!["#!use tutor"]);
        assert_eq!(config.default_language, "python");
        assert_eq!(config.max_document_size, 2048);
        assert_eq!(config.render_format, RenderFormat::Html);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"mode": "student"}"#).unwrap();
        assert_eq!(config.mode, LessonMode::Student);
        assert_eq!(config.lesson_variable, "Lesson");
        assert_eq!(config.max_document_size, DEFAULT_MAX_DOCUMENT_SIZE);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let result: std::result::Result<Config, _> = serde_json::from_str(r#"{"mode": "admin"}"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("admin"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            lesson_variable: "1st lesson".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WaypointError::ConfigValidationError { .. })
        ));

        let config = Config {
            max_document_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            default_language: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            references: vec![String::new()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("Lesson"));
        assert!(is_identifier("_lesson2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2lesson"));
        assert!(!is_identifier("my-lesson"));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("waypoint.json"), "{ not json").unwrap();

        let err = Config::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, WaypointError::ConfigParseError { .. }));
    }

    #[test]
    fn test_load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("waypoint.json"),
            r#"{"lessonVariable": "Tour", "renderFormat": "json"}"#,
        )
        .unwrap();

        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.lesson_variable, "Tour");
        assert_eq!(config.render_format, RenderFormat::Json);
    }

    #[test]
    fn test_load_file_failing_validation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("waypoint.json"), r#"{"maxDocumentSize": 0}"#).unwrap();

        let err = Config::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, WaypointError::ConfigValidationError { .. }));
    }
}
