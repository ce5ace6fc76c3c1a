//! Integration tests for starting lessons from documents.
//!
//! These load the sample lesson fixture, start it through the
//! `#!start-lesson` directive, and walk through its challenges.

use std::path::PathBuf;
use std::sync::Arc;

use waypoint_engine::{
    evaluator_fn, Config, EvaluationResult, Lesson, LessonDocument, LessonMode, LessonParser,
    MarkdownLessonParser, Progression, RenderFormat, StartLessonDirective, StartOptions,
    Submission, WaypointError,
};
use waypoint_kernel::{Command, Kernel, KernelError, Pipeline, RecordingHandler};

/// Path to the fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Path to the sample lesson fixture.
fn fixture_path() -> PathBuf {
    fixtures_dir().join("sample-lesson")
}

fn fixture_config() -> Config {
    Config::load_from_dir(&fixture_path()).expect("Failed to load config")
}

/// A pipeline with the start-lesson directive registered.
fn host(
    options: StartOptions,
) -> (Arc<RecordingHandler>, Arc<Pipeline>, Arc<StartLessonDirective>) {
    let handler = Arc::new(RecordingHandler::new());
    let pipeline = Pipeline::new(handler.clone());
    let directive = Arc::new(StartLessonDirective::new(options).with_base_dir(fixture_path()));
    pipeline.add_directive(directive.clone());
    (handler, pipeline, directive)
}

#[test]
fn test_sample_config_loads() {
    let config = fixture_config();

    assert_eq!(config.mode, LessonMode::Student);
    assert_eq!(config.lesson_variable, "Tour");
    assert_eq!(config.references, vec!["extern crate tutor;"]);
    assert_eq!(config.max_document_size, 16_384);
    assert_eq!(config.render_format, RenderFormat::Json);
}

#[test]
fn test_sample_lesson_parses() {
    let config = fixture_config();
    let document = LessonDocument::load(fixture_path().join("lesson.md"), config.max_document_size)
        .expect("Failed to load lesson");
    let parsed = MarkdownLessonParser::new(config.default_language)
        .parse(&document)
        .expect("Failed to parse lesson");

    assert_eq!(parsed.lesson.name, "Rust Basics");
    assert_eq!(parsed.lesson.setup.len(), 1);

    let shape: Vec<(&str, usize, usize, usize)> = parsed
        .challenges
        .iter()
        .map(|c| {
            (
                c.name.as_str(),
                c.setup.len(),
                c.environment_setup.len(),
                c.contents.len(),
            )
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            ("Bindings", 0, 1, 2),
            ("Functions", 1, 0, 2),
            ("Loops", 1, 1, 1),
        ]
    );
}

#[tokio::test]
async fn test_directive_bootstraps_sample_lesson() {
    let (handler, pipeline, directive) = host(StartOptions::new(fixture_config()));

    pipeline
        .send(Command::submit_code("#!start-lesson lesson.md"))
        .await
        .expect("start-lesson failed");

    assert_eq!(
        handler.executed_sources(),
        vec![
            "use std::fmt::Write;",
            "extern crate tutor;",
            "Bind the number `42` to a variable named `answer`.",
            "let answer = /* your value here */;",
            "let mut scratch = String::new();",
        ]
    );
    assert_eq!(pipeline.middleware_count(), 1);

    let lesson = directive.lesson().expect("lesson started");
    let bound = pipeline
        .variable_as::<tokio::sync::Mutex<Lesson>>("Tour")
        .expect("lesson bound under configured name");
    assert!(Arc::ptr_eq(&bound, &lesson));

    let lesson = lesson.lock().await;
    assert_eq!(lesson.name(), "Rust Basics");
    assert_eq!(lesson.mode(), LessonMode::Student);
    let status = lesson.challenge_status().expect("active challenge");
    assert_eq!(status.name, "Bindings");
    assert!(status.revealed);
}

#[tokio::test]
async fn test_walk_through_sample_lesson() {
    let options = StartOptions::new(fixture_config())
        .with_evaluator(
            "Bindings",
            evaluator_fn(|s: &Submission<'_>| {
                Ok(if s.code.contains("42") {
                    EvaluationResult::success()
                } else {
                    EvaluationResult::failure("answer should be 42").with_hint("let answer = 42;")
                })
            }),
        )
        .with_evaluator(
            "Functions",
            evaluator_fn(|s: &Submission<'_>| {
                Ok(if s.code.contains("square(") {
                    EvaluationResult::success()
                } else {
                    EvaluationResult::partial("call square")
                })
            }),
        );
    let (handler, pipeline, directive) = host(options);
    pipeline
        .send(Command::submit_code("#!start-lesson lesson.md"))
        .await
        .expect("start-lesson failed");
    let lesson = directive.lesson().expect("lesson started");

    let events = pipeline
        .send(Command::submit_code("let answer = 41;"))
        .await
        .expect("submission failed");
    let shown = events
        .iter()
        .find_map(|e| e.displayed_value())
        .expect("evaluation displayed");
    assert_eq!(shown.mime_type, "application/json");
    let rendered: EvaluationResult =
        serde_json::from_str(&shown.value).expect("rendered result is JSON");
    assert_eq!(rendered.hint.as_deref(), Some("let answer = 42;"));
    let current = lesson
        .lock()
        .await
        .current_challenge()
        .map(|c| c.name().to_string());
    assert_eq!(current.as_deref(), Some("Bindings"));

    pipeline
        .send(Command::submit_code("let answer = 42;"))
        .await
        .expect("submission failed");
    pipeline
        .send(Command::submit_code("println!(\"{}\", square(answer));"))
        .await
        .expect("submission failed");

    let sources = handler.executed_sources();
    let functions_setup = sources
        .iter()
        .position(|s| s == "fn square(x: i32) -> i32 { x * x }")
        .expect("Functions setup ran");
    let loops_setup = sources
        .iter()
        .position(|s| s == "let numbers = vec![1, 2, 3];")
        .expect("Loops setup ran");
    assert!(functions_setup < loops_setup);
    assert_eq!(sources.last().map(String::as_str), Some("let mut total = 0;"));

    let lesson = lesson.lock().await;
    let current = lesson.current_challenge().expect("active challenge");
    assert_eq!(current.name(), "Loops");
    assert!(current.is_setup());
    // Loops has no evaluator; submissions there are reported as failures.
    drop(lesson);
    let events = pipeline
        .send(Command::submit_code("for n in &numbers { total += n; }"))
        .await
        .expect("submission failed");
    assert_eq!(events.iter().filter(|e| e.displayed_value().is_some()).count(), 1);
}

#[tokio::test]
async fn test_explicit_progression_jumps_by_name() {
    let options = StartOptions::new(fixture_config()).with_evaluator(
        "Bindings",
        evaluator_fn(|_: &Submission<'_>| {
            Ok(EvaluationResult::success().with_progression(Progression::GoTo("Loops".into())))
        }),
    );
    let (handler, pipeline, directive) = host(options);
    pipeline
        .send(Command::submit_code("#!start-lesson lesson.md"))
        .await
        .expect("start-lesson failed");

    pipeline
        .send(Command::submit_code("let answer = 42;"))
        .await
        .expect("submission failed");

    let lesson = directive.lesson().expect("lesson started");
    let lesson = lesson.lock().await;
    assert_eq!(
        lesson.current_challenge().map(|c| c.name().to_string()),
        Some("Loops".to_string())
    );
    assert!(!handler
        .executed_sources()
        .iter()
        .any(|s| s.starts_with("fn square")));
}

#[tokio::test]
async fn test_broken_lesson_leaves_host_unmodified() {
    let handler = Arc::new(RecordingHandler::new());
    let pipeline = Pipeline::new(handler.clone());
    let directive =
        Arc::new(StartLessonDirective::new(StartOptions::default()).with_base_dir(fixtures_dir()));
    pipeline.add_directive(directive.clone());

    let err = pipeline
        .send(Command::submit_code("#!start-lesson broken-lesson.md"))
        .await
        .expect_err("broken lesson should not start");

    match &err {
        KernelError::DirectiveFailed { directive, source } => {
            assert_eq!(directive, "#!start-lesson");
            let cause = source
                .downcast_ref::<WaypointError>()
                .expect("engine error");
            assert!(cause.is_document_error());
        }
        other => unreachable!("unexpected error: {other}"),
    }
    assert!(handler.executed().is_empty());
    assert_eq!(pipeline.middleware_count(), 0);
    assert!(pipeline.variable("Lesson").is_none());
    assert!(directive.lesson().is_none());

    // A plain submission still goes straight to the host.
    pipeline
        .send(Command::submit_code("1 + 1"))
        .await
        .expect("host still works");
    assert_eq!(handler.executed_sources(), vec!["1 + 1"]);
}

#[tokio::test]
async fn test_oversized_lesson_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("huge.md");
    std::fs::write(&path, format!("## [Challenge] Big\n\n{}", "text ".repeat(1000)))
        .expect("write lesson");
    let config = Config {
        max_document_size: 1024,
        ..Config::default()
    };

    let handler = Arc::new(RecordingHandler::new());
    let pipeline = Pipeline::new(handler.clone());
    let kernel: Arc<dyn Kernel> = pipeline.clone();
    let err = waypoint_engine::start_lesson(&kernel, &path, &StartOptions::new(config))
        .await
        .expect_err("oversized lesson should not start");

    assert!(matches!(err, WaypointError::LessonTooLarge { .. }));
    assert!(handler.executed().is_empty());
    assert_eq!(pipeline.middleware_count(), 0);
}
