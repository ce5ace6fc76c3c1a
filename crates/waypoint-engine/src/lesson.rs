//! Lesson state: the active challenge, lesson-wide setup, and the setup
//! command classifier.
//!
//! A session owns exactly one [`Lesson`], shared as a [`SharedLesson`]
//! between the progression middleware, the bootstrap code and the execution
//! environment it is bound into.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};
use waypoint_kernel::Command;

use crate::challenge::{Challenge, ChallengeRef, ChallengeStatus};

/// A lesson shared between the pipeline and the bootstrap code.
pub type SharedLesson = Arc<tokio::sync::Mutex<Lesson>>;

/// Resolves a challenge by name.
pub type ChallengeLookup =
    Arc<dyn Fn(&str) -> BoxFuture<'static, Option<ChallengeRef>> + Send + Sync>;

// ============================================================================
// LessonMode
// ============================================================================

/// Reset policy for in-progress challenge state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonMode {
    /// Resets discard the current challenge and start from a clean slate.
    #[default]
    Teacher,
    /// Resets are ignored; learner progress is never discarded.
    Student,
}

impl FromStr for LessonMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            _ => Err(format!(
                "unknown lesson mode '{s}', expected 'teacher' or 'student'"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for LessonMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for LessonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Teacher => write!(f, "teacher"),
            Self::Student => write!(f, "student"),
        }
    }
}

// ============================================================================
// Lesson
// ============================================================================

/// Static lesson-level definition produced from a lesson document.
#[derive(Debug, Clone, Default)]
pub struct LessonDefinition {
    /// Lesson name.
    pub name: String,
    /// Commands run once when the lesson starts.
    pub setup: Vec<Command>,
}

/// Progression state of a guided lesson.
#[derive(Default)]
pub struct Lesson {
    name: String,
    setup: Vec<Command>,
    current_challenge: Option<ChallengeRef>,
    mode: LessonMode,
    challenge_lookup: Option<ChallengeLookup>,
}

impl Lesson {
    /// Creates a lesson from a definition.
    #[must_use]
    pub fn new(definition: LessonDefinition) -> Self {
        let mut lesson = Self::default();
        lesson.load_definition(definition);
        lesson
    }

    /// Replaces the lesson name and setup with those of `definition`.
    pub fn load_definition(&mut self, definition: LessonDefinition) {
        self.name = definition.name;
        self.setup = definition.setup;
    }

    /// Wraps the lesson for sharing.
    #[must_use]
    pub fn into_shared(self) -> SharedLesson {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Lesson name; empty after [`Lesson::clear`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lesson-wide setup commands.
    #[must_use]
    pub fn setup(&self) -> &[Command] {
        &self.setup
    }

    /// Current reset policy.
    #[must_use]
    pub const fn mode(&self) -> LessonMode {
        self.mode
    }

    /// Sets the reset policy.
    pub fn set_mode(&mut self, mode: LessonMode) {
        self.mode = mode;
    }

    /// The active challenge.
    #[must_use]
    pub const fn current_challenge(&self) -> Option<&ChallengeRef> {
        self.current_challenge.as_ref()
    }

    /// Makes `challenge` the active challenge and marks it revealed.
    ///
    /// Passing `None` clears the active challenge.
    pub fn start_challenge(&mut self, challenge: Option<ChallengeRef>) {
        if let Some(challenge) = &challenge {
            challenge.reveal();
            info!(challenge = %challenge.name(), "Challenge started");
        }
        self.current_challenge = challenge;
    }

    /// Resolves `name` through the installed lookup and starts that challenge.
    ///
    /// Unknown names, and calls made before a lookup is installed, leave the
    /// active challenge unchanged.
    pub async fn start_challenge_named(&mut self, name: &str) {
        let Some(lookup) = self.challenge_lookup.clone() else {
            warn!(challenge = %name, "No challenge lookup installed, ignoring");
            return;
        };

        match lookup(name).await {
            Some(challenge) => self.start_challenge(Some(challenge)),
            None => warn!(challenge = %name, "Unknown challenge, staying put"),
        }
    }

    /// Installs a synchronous challenge resolver.
    pub fn set_challenge_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<ChallengeRef> + Send + Sync + 'static,
    {
        let lookup: ChallengeLookup =
            Arc::new(move |name: &str| future::ready(lookup(name)).boxed());
        self.challenge_lookup = Some(lookup);
    }

    /// Installs an asynchronous challenge resolver.
    pub fn set_async_challenge_lookup<F, Fut>(&mut self, lookup: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<ChallengeRef>> + Send + 'static,
    {
        let lookup: ChallengeLookup = Arc::new(move |name: &str| lookup(name.to_string()).boxed());
        self.challenge_lookup = Some(lookup);
    }

    /// Returns `true` if `command` is, or derives from, a setup command of
    /// the active challenge or of the lesson.
    ///
    /// Such commands are executed without being evaluated.
    #[must_use]
    pub fn is_setup_command(&self, command: &Command) -> bool {
        let challenge_setup = self
            .current_challenge
            .iter()
            .flat_map(|c| c.environment_setup().iter().chain(c.setup()));

        let is_setup = challenge_setup
            .chain(&self.setup)
            .any(|setup| command.is_or_derives_from(setup));
        debug!(command = %command.id(), is_setup, "Classified command");
        is_setup
    }

    /// Resets the active challenge according to the lesson mode.
    ///
    /// In teacher mode the active challenge is replaced by a fresh,
    /// unconfigured one. In student mode nothing changes.
    pub fn reset_challenge(&mut self) {
        match self.mode {
            LessonMode::Teacher => {
                debug!("Resetting current challenge");
                self.current_challenge = Some(Arc::new(Challenge::default()));
            }
            LessonMode::Student => debug!("Student mode, keeping current challenge"),
        }
    }

    /// Clears the lesson name and the active challenge.
    pub fn clear(&mut self) {
        self.name.clear();
        self.current_challenge = None;
    }

    /// Progress snapshot of the active challenge.
    #[must_use]
    pub fn challenge_status(&self) -> Option<ChallengeStatus> {
        self.current_challenge.as_ref().map(|c| c.status())
    }
}

impl std::fmt::Debug for Lesson {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lesson")
            .field("name", &self.name)
            .field("setup", &self.setup.len())
            .field(
                "current_challenge",
                &self.current_challenge.as_ref().map(|c| c.name()),
            )
            .field("mode", &self.mode)
            .field("has_lookup", &self.challenge_lookup.is_some())
            .finish()
    }
}
