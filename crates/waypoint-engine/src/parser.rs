//! Lesson document parsing.
//!
//! A [`LessonParser`] turns a [`LessonDocument`] into blueprints: one
//! [`LessonBlueprint`] for the lesson-wide name and setup, and one
//! [`ChallengeBlueprint`] per challenge, in document order.
//!
//! The bundled [`MarkdownLessonParser`] reads documents like:
//!
//! ````markdown
//! # [Lesson] Collections
//!
//! ```rust setup
//! use std::collections::HashMap;
//! ```
//!
//! ## [Challenge] Insert
//!
//! Create a map and insert one entry.
//!
//! ```rust
//! let mut map = HashMap::new();
//! ```
//!
//! ```rust environment-setup
//! let mut scores = HashMap::<String, u32>::new();
//! ```
//! ````

use regex::Regex;
use serde::Serialize;
use tracing::debug;
use waypoint_kernel::Command;

use crate::challenge::Challenge;
use crate::document::LessonDocument;
use crate::error::{Result, WaypointError};
use crate::lesson::LessonDefinition;

/// Lesson-wide part of a parsed document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonBlueprint {
    /// Lesson name.
    pub name: String,
    /// Lesson-wide setup commands.
    pub setup: Vec<Command>,
}

impl LessonBlueprint {
    /// Converts the blueprint into a lesson definition.
    #[must_use]
    pub fn to_definition(&self) -> LessonDefinition {
        LessonDefinition {
            name: self.name.clone(),
            setup: self.setup.clone(),
        }
    }
}

/// One challenge of a parsed document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeBlueprint {
    /// Challenge name.
    pub name: String,
    /// 1-indexed line of the challenge heading.
    pub line: usize,
    /// One-time setup commands.
    pub setup: Vec<Command>,
    /// Per-activation setup commands.
    pub environment_setup: Vec<Command>,
    /// Presentation commands.
    pub contents: Vec<Command>,
}

impl ChallengeBlueprint {
    fn new(name: String, line: usize) -> Self {
        Self {
            name,
            line,
            setup: Vec::new(),
            environment_setup: Vec::new(),
            contents: Vec::new(),
        }
    }

    /// Builds an unevaluated challenge from the blueprint.
    ///
    /// Commands keep their identity, so setup classification works against
    /// the blueprint's commands as well.
    #[must_use]
    pub fn to_challenge(&self) -> Challenge {
        Challenge::new(self.name.clone())
            .with_setup(self.setup.clone())
            .with_environment_setup(self.environment_setup.clone())
            .with_contents(self.contents.clone())
    }
}

/// Blueprints produced from one document.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedLesson {
    /// Lesson-wide blueprint.
    pub lesson: LessonBlueprint,
    /// Challenge blueprints in document order.
    pub challenges: Vec<ChallengeBlueprint>,
}

/// Turns lesson documents into blueprints.
pub trait LessonParser: Send + Sync {
    /// Parses `document`.
    ///
    /// # Errors
    ///
    /// Returns `WaypointError::LessonParseError` if the document is malformed.
    fn parse(&self, document: &LessonDocument) -> Result<ParsedLesson>;
}

// ============================================================================
// Markdown
// ============================================================================

const HEADING_PATTERN: &str =
    r"^#[ \t]+\[Lesson\][ \t]+(?P<lesson>\S.*?)\s*$|^##[ \t]+\[Challenge\][ \t]+(?P<challenge>\S.*?)\s*$";

/// An opening code fence: a run of at least three backticks or tildes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    /// Parses an opening fence, returning it with its info string.
    fn open(line: &str) -> Option<(Self, &str)> {
        let line = line.trim_start();
        let marker = line.chars().next().filter(|&c| matches!(c, '`' | '~'))?;
        let len = line.chars().take_while(|&c| c == marker).count();
        if len < 3 {
            return None;
        }
        // Both markers are ASCII, so `len` is also a byte offset.
        let info = &line[len..];
        if marker == '`' && info.contains('`') {
            return None;
        }
        Some((Self { marker, len }, info))
    }

    /// Returns `true` if `line` closes this fence.
    fn is_closed_by(self, line: &str) -> bool {
        let line = line.trim();
        let run = line.chars().take_while(|&c| c == self.marker).count();
        run >= self.len && run == line.len()
    }
}

/// Parser for Markdown lesson documents.
///
/// - `# [Lesson] <name>` names the lesson; the file stem is used otherwise.
/// - `## [Challenge] <name>` starts a challenge.
/// - Fenced blocks tagged `setup` are setup commands: lesson-wide before the
///   first challenge, challenge setup after it.
/// - Fenced blocks tagged `environment-setup` are run on every activation of
///   their challenge.
/// - Other fenced blocks become editable code cells, and prose between
///   blocks becomes Markdown, both shown on every activation.
/// - Fences are runs of three or more backticks or tildes; a block ends at
///   a run of the same marker at least as long as the one that opened it.
#[derive(Debug, Clone)]
pub struct MarkdownLessonParser {
    default_language: String,
}

impl MarkdownLessonParser {
    /// Creates a parser that assigns `default_language` to untagged blocks.
    #[must_use]
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
        }
    }
}

impl Default for MarkdownLessonParser {
    fn default() -> Self {
        Self::new("rust")
    }
}

impl LessonParser for MarkdownLessonParser {
    fn parse(&self, document: &LessonDocument) -> Result<ParsedLesson> {
        let Ok(heading) = Regex::new(HEADING_PATTERN) else {
            return Err(WaypointError::lesson_parse(
                &document.path,
                0,
                "heading pattern failed to compile",
            ));
        };

        let mut builder = Builder::new(document);
        let mut lines = document.content.lines().enumerate();

        while let Some((index, line)) = lines.next() {
            let line_number = index + 1;

            if let Some((fence, info)) = Fence::open(line) {
                builder.flush_prose();
                let mut body = Vec::new();
                let mut closed = false;
                for (_, inner) in lines.by_ref() {
                    if fence.is_closed_by(inner) {
                        closed = true;
                        break;
                    }
                    body.push(inner);
                }
                if !closed {
                    return Err(WaypointError::lesson_parse(
                        &document.path,
                        line_number,
                        "unterminated code block",
                    ));
                }
                let role = BlockRole::from_info(info, &self.default_language);
                builder.add_block(role, body.join("\n"), line_number)?;
                continue;
            }

            if let Some(captures) = heading.captures(line) {
                builder.flush_prose();
                if let Some(name) = captures.name("lesson") {
                    builder.set_lesson_name(name.as_str(), line_number)?;
                } else if let Some(name) = captures.name("challenge") {
                    builder.start_challenge(name.as_str(), line_number)?;
                }
                continue;
            }

            builder.prose.push(line);
        }
        builder.flush_prose();

        builder.finish()
    }
}

/// What a fenced block is used for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockRole {
    Setup,
    EnvironmentSetup,
    Content { language: String },
}

impl BlockRole {
    fn from_info(info: &str, default_language: &str) -> Self {
        let words: Vec<&str> = info.split_whitespace().collect();
        if words.contains(&"environment-setup") {
            Self::EnvironmentSetup
        } else if words.contains(&"setup") {
            Self::Setup
        } else {
            Self::Content {
                language: words
                    .first()
                    .map_or_else(|| default_language.to_string(), |w| (*w).to_string()),
            }
        }
    }
}

struct Builder<'a> {
    document: &'a LessonDocument,
    lesson_name: Option<String>,
    lesson_setup: Vec<Command>,
    challenges: Vec<ChallengeBlueprint>,
    prose: Vec<&'a str>,
}

impl<'a> Builder<'a> {
    const fn new(document: &'a LessonDocument) -> Self {
        Self {
            document,
            lesson_name: None,
            lesson_setup: Vec::new(),
            challenges: Vec::new(),
            prose: Vec::new(),
        }
    }

    fn error(&self, line: usize, message: impl Into<String>) -> WaypointError {
        WaypointError::lesson_parse(&self.document.path, line, message)
    }

    fn set_lesson_name(&mut self, name: &str, line: usize) -> Result<()> {
        if self.lesson_name.is_some() {
            return Err(self.error(line, "lesson heading appears more than once"));
        }
        self.lesson_name = Some(name.to_string());
        Ok(())
    }

    fn start_challenge(&mut self, name: &str, line: usize) -> Result<()> {
        if let Some(existing) = self.challenges.iter().find(|c| c.name == name) {
            return Err(self.error(
                line,
                format!(
                    "duplicate challenge name '{name}' (first defined at line {})",
                    existing.line
                ),
            ));
        }
        self.challenges
            .push(ChallengeBlueprint::new(name.to_string(), line));
        Ok(())
    }

    fn add_block(&mut self, role: BlockRole, code: String, line: usize) -> Result<()> {
        let path = &self.document.path;
        match (role, self.challenges.last_mut()) {
            (BlockRole::Setup, Some(challenge)) => {
                challenge.setup.push(Command::submit_code(code));
            }
            (BlockRole::Setup, None) => self.lesson_setup.push(Command::submit_code(code)),
            (BlockRole::EnvironmentSetup, Some(challenge)) => {
                challenge.environment_setup.push(Command::submit_code(code));
            }
            (BlockRole::EnvironmentSetup, None) => {
                return Err(WaypointError::lesson_parse(
                    path,
                    line,
                    "environment-setup block outside of a challenge",
                ));
            }
            (BlockRole::Content { language }, Some(challenge)) => {
                challenge
                    .contents
                    .push(Command::send_editable_code(language, code));
            }
            (BlockRole::Content { .. }, None) => {
                debug!(line, "Skipping code block before the first challenge");
            }
        }
        Ok(())
    }

    fn flush_prose(&mut self) {
        let text = self.prose.join("\n");
        self.prose.clear();
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if let Some(challenge) = self.challenges.last_mut() {
            challenge.contents.push(Command::display_markdown(text));
        }
    }

    fn finish(self) -> Result<ParsedLesson> {
        if self.challenges.is_empty() {
            let line = self.document.content.lines().count().max(1);
            return Err(self.error(line, "lesson defines no challenges"));
        }

        let name = self
            .lesson_name
            .unwrap_or_else(|| self.document.stem());
        debug!(
            lesson = %name,
            challenges = self.challenges.len(),
            "Parsed lesson document"
        );

        Ok(ParsedLesson {
            lesson: LessonBlueprint {
                name,
                setup: self.lesson_setup,
            },
            challenges: self.challenges,
        })
    }
}
