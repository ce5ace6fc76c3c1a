//! Waypoint Engine
//!
//! Drives guided lessons: challenges, setup classification, evaluation of
//! learner submissions, and progression from one challenge to the next,
//! layered over any [`waypoint_kernel::Kernel`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use waypoint_engine::{evaluator_fn, start_lesson, EvaluationResult, StartOptions, Submission};
//! use waypoint_kernel::{Command, Kernel, Pipeline, RecordingHandler};
//!
//! # tokio_test::block_on(async {
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("hello.md");
//! std::fs::write(&path, "## [Challenge] Hello\n\n## [Challenge] Goodbye\n").unwrap();
//!
//! let pipeline = Pipeline::new(Arc::new(RecordingHandler::new()));
//! let kernel: Arc<dyn Kernel> = pipeline.clone();
//! let options = StartOptions::default().with_default_evaluator(evaluator_fn(
//!     |s: &Submission<'_>| Ok(if s.code.contains("hello") {
//!         EvaluationResult::success()
//!     } else {
//!         EvaluationResult::failure("say hello")
//!     }),
//! ));
//!
//! let lesson = start_lesson(&kernel, &path, &options).await.unwrap();
//! pipeline.send(Command::submit_code("println!(\"hello\")")).await.unwrap();
//!
//! let lesson = lesson.lock().await;
//! assert_eq!(lesson.current_challenge().unwrap().name(), "Goodbye");
//! # });
//! ```

pub mod challenge;
pub mod config;
pub mod document;
pub mod error;
pub mod evaluation;
pub mod lesson;
pub mod middleware;
pub mod parser;
pub mod render;
pub mod session;

pub use challenge::{
    set_default_progression, Challenge, ChallengeRef, ChallengeStatus, NO_CRITERIA_REASON,
};
pub use config::{Config, DEFAULT_MAX_DOCUMENT_SIZE};
pub use document::LessonDocument;
pub use error::{Result, WaypointError};
pub use evaluation::{evaluator_fn, EvaluationResult, Evaluator, Outcome, Progression, Submission};
pub use lesson::{ChallengeLookup, Lesson, LessonDefinition, LessonMode, SharedLesson};
pub use middleware::ProgressionMiddleware;
pub use parser::{
    ChallengeBlueprint, LessonBlueprint, LessonParser, MarkdownLessonParser, ParsedLesson,
};
pub use render::{HtmlRender, JsonRender, MarkdownRender, Render, RenderFormat};
pub use session::{
    bootstrap_environment, initialize_challenge, initialize_lesson, start_lesson, StartLessonDirective,
    StartOptions, START_LESSON_DIRECTIVE,
};
