//! Challenges: the individual steps of a lesson.
//!
//! A [`Challenge`] pairs an immutable step definition (setup commands,
//! presentation contents, grading logic) with the learner's accumulated
//! progress on that step. Challenges are shared as [`ChallengeRef`] and
//! compared by identity, never by contents.
//!
//! Setup and activation are driven by the session (see
//! [`initialize_challenge`](crate::initialize_challenge)); a challenge only
//! records the flags and grades submissions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use waypoint_kernel::{Command, KernelEvent};

use crate::error::Result;
use crate::evaluation::{EvaluationResult, Evaluator, Outcome, Progression, Submission};
use crate::lesson::SharedLesson;

/// Shared handle to a challenge. Identity is pointer identity.
pub type ChallengeRef = Arc<Challenge>;

/// Reason reported when a challenge has nothing to grade against.
pub const NO_CRITERIA_REASON: &str = "This challenge has no evaluation criteria.";

/// Learner progress on a challenge.
#[derive(Debug, Clone, Default)]
struct ChallengeState {
    is_setup: bool,
    revealed: bool,
    current_evaluation: Option<EvaluationResult>,
}

/// A single step of a lesson.
#[derive(Default)]
pub struct Challenge {
    name: String,
    setup: Vec<Command>,
    environment_setup: Vec<Command>,
    contents: Vec<Command>,
    evaluator: Option<Arc<dyn Evaluator>>,
    next: Option<String>,
    state: Mutex<ChallengeState>,
}

impl Challenge {
    /// Creates an empty challenge with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the commands run once, the first time the challenge is activated.
    #[must_use]
    pub fn with_setup(mut self, setup: Vec<Command>) -> Self {
        self.setup = setup;
        self
    }

    /// Sets the commands run on every activation.
    #[must_use]
    pub fn with_environment_setup(mut self, environment_setup: Vec<Command>) -> Self {
        self.environment_setup = environment_setup;
        self
    }

    /// Sets the presentation material re-sent on every activation.
    #[must_use]
    pub fn with_contents(mut self, contents: Vec<Command>) -> Self {
        self.contents = contents;
        self
    }

    /// Sets the grading logic.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Sets the challenge to advance to after a successful evaluation.
    #[must_use]
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Installs grading logic on an existing challenge.
    pub fn set_evaluator(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluator = Some(evaluator);
    }

    /// Name of the challenge, unique within its lesson.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-time setup commands.
    #[must_use]
    pub fn setup(&self) -> &[Command] {
        &self.setup
    }

    /// Per-activation setup commands.
    #[must_use]
    pub fn environment_setup(&self) -> &[Command] {
        &self.environment_setup
    }

    /// Presentation commands.
    #[must_use]
    pub fn contents(&self) -> &[Command] {
        &self.contents
    }

    /// Name of the challenge that follows a success, if any.
    #[must_use]
    pub fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }

    /// Returns `true` if the grading logic is installed.
    #[must_use]
    pub fn has_evaluator(&self) -> bool {
        self.evaluator.is_some()
    }

    fn state(&self) -> MutexGuard<'_, ChallengeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` once the one-time setup has completed.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        self.state().is_setup
    }

    /// Records that the one-time setup completed. Never reverts.
    pub(crate) fn mark_setup(&self) {
        self.state().is_setup = true;
    }

    /// Returns `true` once the challenge has ever been active.
    #[must_use]
    pub fn is_revealed(&self) -> bool {
        self.state().revealed
    }

    pub(crate) fn reveal(&self) {
        self.state().revealed = true;
    }

    /// The result of the most recent evaluation.
    #[must_use]
    pub fn current_evaluation(&self) -> Option<EvaluationResult> {
        self.state().current_evaluation.clone()
    }

    /// Grades a submission and applies any resulting progression to `lesson`.
    ///
    /// Grading runs without holding the lesson lock, so evaluators may read
    /// the lesson themselves. The lock is taken only to apply progression.
    ///
    /// # Errors
    ///
    /// Returns the evaluator's error unchanged; in that case neither the
    /// current evaluation nor the lesson is modified.
    pub async fn evaluate(
        &self,
        code: &str,
        events: &[KernelEvent],
        lesson: &SharedLesson,
    ) -> Result<EvaluationResult> {
        let result = self.grade(code, events).await?;
        if let Some(target) = self.progression_target(&result) {
            lesson.lock().await.start_challenge_named(&target).await;
        }
        Ok(result)
    }

    /// Grades a submission and stores the result as the current evaluation.
    ///
    /// A challenge without grading logic yields a `Failure` explaining that
    /// there is nothing to grade against.
    ///
    /// # Errors
    ///
    /// Returns the evaluator's error unchanged, leaving the current
    /// evaluation as it was.
    #[instrument(level = "debug", skip_all, fields(challenge = %self.name))]
    pub async fn grade(&self, code: &str, events: &[KernelEvent]) -> Result<EvaluationResult> {
        let result = match &self.evaluator {
            Some(evaluator) => {
                let submission = Submission {
                    challenge: &self.name,
                    code,
                    events,
                };
                evaluator.evaluate(&submission).await?
            }
            None => EvaluationResult::failure(NO_CRITERIA_REASON),
        };
        debug!(outcome = %result.outcome, "Submission evaluated");

        self.state().current_evaluation = Some(result.clone());
        Ok(result)
    }

    /// Name of the challenge `result` asks the lesson to move to, if any.
    #[must_use]
    pub fn progression_target(&self, result: &EvaluationResult) -> Option<String> {
        match &result.progression {
            Progression::Stay => None,
            Progression::GoTo(name) => Some(name.clone()),
            Progression::Default => match result.outcome {
                Outcome::Success => self.next.clone(),
                Outcome::PartialSuccess | Outcome::Failure => None,
            },
        }
    }

    /// A serializable snapshot of this challenge's progress.
    #[must_use]
    pub fn status(&self) -> ChallengeStatus {
        let state = self.state();
        ChallengeStatus {
            name: self.name.clone(),
            is_setup: state.is_setup,
            revealed: state.revealed,
            last_outcome: state.current_evaluation.as_ref().map(|e| e.outcome),
        }
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Challenge")
            .field("name", &self.name)
            .field("setup", &self.setup.len())
            .field("environment_setup", &self.environment_setup.len())
            .field("contents", &self.contents.len())
            .field("has_evaluator", &self.evaluator.is_some())
            .field("next", &self.next)
            .field("state", &*self.state())
            .finish()
    }
}

/// Progress snapshot of one challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeStatus {
    /// Challenge name.
    pub name: String,
    /// Whether the one-time setup has run.
    pub is_setup: bool,
    /// Whether the challenge has ever been active.
    pub revealed: bool,
    /// Outcome of the most recent evaluation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<Outcome>,
}

/// Links each challenge to the one after it.
///
/// Challenges that already name a successor keep it; the last challenge has
/// none.
pub fn set_default_progression(challenges: &mut [Challenge]) {
    let names: Vec<String> = challenges.iter().map(|c| c.name.clone()).collect();
    for (challenge, next) in challenges.iter_mut().zip(names.into_iter().skip(1)) {
        if challenge.next.is_none() {
            challenge.next = Some(next);
        }
    }
}
