//! Evaluation contract for challenge submissions.
//!
//! Grading is pluggable: a challenge holds an [`Evaluator`] that turns a
//! [`Submission`] into an [`EvaluationResult`]. Besides the outcome shown to
//! the learner, a result carries a [`Progression`] side channel telling the
//! challenge whether the lesson should move on.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waypoint_kernel::KernelEvent;

use crate::error::Result;

/// How a submission fared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The submission meets every criterion.
    Success,
    /// The submission meets some criteria.
    PartialSuccess,
    /// The submission does not meet the criteria.
    Failure,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// What the lesson should do after an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "challenge", rename_all = "snake_case")]
pub enum Progression {
    /// Follow the challenge's own rule: advance to its successor on success.
    #[default]
    Default,
    /// Remain on the current challenge regardless of outcome.
    Stay,
    /// Move to the named challenge.
    GoTo(String),
}

/// The outcome of evaluating one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Overall outcome.
    pub outcome: Outcome,
    /// Explanation shown to the learner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Optional nudge toward a correct answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Progression request for the lesson.
    #[serde(default)]
    pub progression: Progression,
    /// When the evaluation finished.
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    /// Creates a result with the given outcome and no explanation.
    #[must_use]
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            reason: None,
            hint: None,
            progression: Progression::Default,
            evaluated_at: Utc::now(),
        }
    }

    /// Creates a `Success` result.
    #[must_use]
    pub fn success() -> Self {
        Self::new(Outcome::Success)
    }

    /// Creates a `PartialSuccess` result with a reason.
    #[must_use]
    pub fn partial(reason: impl Into<String>) -> Self {
        Self::new(Outcome::PartialSuccess).with_reason(reason)
    }

    /// Creates a `Failure` result with a reason.
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::new(Outcome::Failure).with_reason(reason)
    }

    /// Sets the explanation.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Sets the progression request.
    #[must_use]
    pub fn with_progression(mut self, progression: Progression) -> Self {
        self.progression = progression;
        self
    }

    /// Returns `true` if the outcome is `Success`.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// A learner submission under evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    /// Name of the challenge being attempted.
    pub challenge: &'a str,
    /// The submitted code.
    pub code: &'a str,
    /// Events the kernel produced while executing the code.
    pub events: &'a [KernelEvent],
}

/// Grading logic for a challenge.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Grades `submission`.
    async fn evaluate(&self, submission: &Submission<'_>) -> Result<EvaluationResult>;
}

/// Adapts a synchronous closure into an [`Evaluator`].
///
/// # Examples
///
/// ```
/// use waypoint_engine::{evaluator_fn, EvaluationResult, Evaluator, Submission};
///
/// let evaluator = evaluator_fn(|submission: &Submission<'_>| {
///     if submission.code.contains("println!") {
///         Ok(EvaluationResult::success())
///     } else {
///         Ok(EvaluationResult::failure("print something"))
///     }
/// });
/// # let _ = evaluator;
/// ```
pub fn evaluator_fn<F>(f: F) -> Arc<dyn Evaluator>
where
    F: Fn(&Submission<'_>) -> Result<EvaluationResult> + Send + Sync + 'static,
{
    Arc::new(FnEvaluator(f))
}

struct FnEvaluator<F>(F);

#[async_trait]
impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&Submission<'_>) -> Result<EvaluationResult> + Send + Sync + 'static,
{
    async fn evaluate(&self, submission: &Submission<'_>) -> Result<EvaluationResult> {
        (self.0)(submission)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::WaypointError;

    #[test]
    fn test_constructors() {
        let result = EvaluationResult::success();
        assert!(result.passed());
        assert!(result.reason.is_none());
        assert_eq!(result.progression, Progression::Default);

        let result = EvaluationResult::failure("missing semicolon").with_hint("look at line 1");
        assert!(!result.passed());
        assert_eq!(result.reason.as_deref(), Some("missing semicolon"));
        assert_eq!(result.hint.as_deref(), Some("look at line 1"));

        let result = EvaluationResult::partial("half way").with_progression(Progression::Stay);
        assert_eq!(result.outcome, Outcome::PartialSuccess);
        assert_eq!(result.progression, Progression::Stay);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Success.to_string(), "success");
        assert_eq!(Outcome::PartialSuccess.to_string(), "partial_success");
        assert_eq!(Outcome::Failure.to_string(), "failure");
    }

    #[test]
    fn test_progression_serialization() {
        assert_eq!(
            serde_json::to_string(&Progression::Default).unwrap(),
            r#"{"action":"default"}"#
        );
        assert_eq!(
            serde_json::to_string(&Progression::GoTo("Loops".into())).unwrap(),
            r#"{"action":"go_to","challenge":"Loops"}"#
        );
    }

    #[test]
    fn test_result_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&EvaluationResult::success()).unwrap();
        assert!(json.contains(r#""outcome":"success""#));
        assert!(json.contains("evaluatedAt"));
        assert!(!json.contains("reason"));
        assert!(!json.contains("hint"));
    }

    #[tokio::test]
    async fn test_evaluator_fn_sees_submission() {
        let evaluator = evaluator_fn(|submission: &Submission<'_>| {
            if submission.code.trim() == "42" {
                Ok(EvaluationResult::success())
            } else {
                Err(WaypointError::evaluation(submission.challenge, "wrong answer"))
            }
        });

        let ok = evaluator
            .evaluate(&Submission {
                challenge: "Answer",
                code: "42",
                events: &[],
            })
            .await
            .unwrap();
        assert!(ok.passed());

        let err = evaluator
            .evaluate(&Submission {
                challenge: "Answer",
                code: "41",
                events: &[],
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Answer"));
    }
}
