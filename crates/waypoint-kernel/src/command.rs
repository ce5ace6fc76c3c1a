//! Commands sent through the kernel pipeline.
//!
//! Every [`Command`] carries an opaque [`CommandId`] assigned when it is
//! created. Cloning a command keeps its id, so a command forwarded or
//! re-wrapped by the pipeline is still recognised as the same command.
//! Equality between commands is identity equality: two commands with the same
//! payload created separately are different commands.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity token attached to a [`Command`] at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Allocates a fresh, never-before-seen identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of command kinds the pipeline understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandKind {
    /// Code submitted for execution.
    SubmitCode {
        /// The submitted source text.
        code: String,
    },
    /// Code placed in front of the learner as an editable cell.
    SendEditableCode {
        /// Language of the cell.
        language: String,
        /// Initial cell contents.
        code: String,
    },
    /// Prose shown to the learner.
    DisplayMarkdown {
        /// Markdown source.
        markdown: String,
    },
}

impl CommandKind {
    /// Returns the command kind name as a string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SubmitCode { .. } => "submit_code",
            Self::SendEditableCode { .. } => "send_editable_code",
            Self::DisplayMarkdown { .. } => "display_markdown",
        }
    }
}

/// A unit of submitted or system-issued work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    id: CommandId,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<CommandId>,
    #[serde(flatten)]
    kind: CommandKind,
}

impl Command {
    /// Creates a new root command with a fresh identity.
    #[must_use]
    pub fn new(kind: CommandKind) -> Self {
        Self {
            id: CommandId::new(),
            parent: None,
            kind,
        }
    }

    /// Creates a `SubmitCode` command.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypoint_kernel::Command;
    ///
    /// let a = Command::submit_code("1 + 1");
    /// let b = Command::submit_code("1 + 1");
    /// assert_eq!(a, a.clone());
    /// assert_ne!(a, b);
    /// ```
    #[must_use]
    pub fn submit_code(code: impl Into<String>) -> Self {
        Self::new(CommandKind::SubmitCode { code: code.into() })
    }

    /// Creates a `SendEditableCode` command.
    #[must_use]
    pub fn send_editable_code(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(CommandKind::SendEditableCode {
            language: language.into(),
            code: code.into(),
        })
    }

    /// Creates a `DisplayMarkdown` command.
    #[must_use]
    pub fn display_markdown(markdown: impl Into<String>) -> Self {
        Self::new(CommandKind::DisplayMarkdown {
            markdown: markdown.into(),
        })
    }

    /// Creates a command derived from `parent`, with its own fresh identity.
    #[must_use]
    pub fn child_of(parent: &Self, kind: CommandKind) -> Self {
        Self {
            id: CommandId::new(),
            parent: Some(parent.id),
            kind,
        }
    }

    /// Returns this command's identity.
    #[must_use]
    pub const fn id(&self) -> CommandId {
        self.id
    }

    /// Returns the identity of the command this one was derived from.
    #[must_use]
    pub const fn parent(&self) -> Option<CommandId> {
        self.parent
    }

    /// Returns the command payload.
    #[must_use]
    pub const fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Returns the submitted code for `SubmitCode` commands.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match &self.kind {
            CommandKind::SubmitCode { code } => Some(code),
            CommandKind::SendEditableCode { .. } | CommandKind::DisplayMarkdown { .. } => None,
        }
    }

    /// Returns `true` if `self` is `other` or was derived directly from it.
    #[must_use]
    pub fn is_or_derives_from(&self, other: &Self) -> bool {
        self.id == other.id || self.parent == Some(other.id)
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Command {}

impl std::hash::Hash for Command {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
