//! End-to-end progression tests.
//!
//! These drive a hand-built lesson through the in-process pipeline and check
//! the ordering and idempotence guarantees of setup, evaluation and
//! challenge initialization.

use std::sync::Arc;

use tokio::sync::broadcast::Receiver;
use waypoint_engine::{
    bootstrap_environment, evaluator_fn, initialize_challenge, initialize_lesson, Challenge,
    ChallengeRef, Config, EvaluationResult, Lesson, LessonDefinition, LessonMode, MarkdownRender,
    ProgressionMiddleware, SharedLesson, Submission,
};
use waypoint_kernel::{Command, CommandId, Kernel, KernelEvent, Pipeline, RecordingHandler};

/// The two-challenge lesson from the reference scenario.
struct Scenario {
    handler: Arc<RecordingHandler>,
    pipeline: Arc<Pipeline>,
    kernel: Arc<dyn Kernel>,
    lesson: SharedLesson,
    a: ChallengeRef,
    b: ChallengeRef,
    cmd_a1: Command,
    cmd_a2: Command,
    cmd_b1: Command,
}

fn scenario(mode: LessonMode) -> Scenario {
    let handler = Arc::new(RecordingHandler::new());
    let pipeline = Pipeline::new(handler.clone());
    let kernel: Arc<dyn Kernel> = pipeline.clone();

    let cmd_a1 = Command::submit_code("let a1 = 1;");
    let cmd_a2 = Command::submit_code("let a2 = 2;");
    let cmd_b1 = Command::submit_code("let b1 = 1;");

    let grader = evaluator_fn(|s: &Submission<'_>| {
        Ok(if s.code.contains("solve") {
            EvaluationResult::success()
        } else {
            EvaluationResult::failure("not solved")
        })
    });

    let a: ChallengeRef = Arc::new(
        Challenge::new("A")
            .with_setup(vec![cmd_a1.clone()])
            .with_environment_setup(vec![cmd_a2.clone()])
            .with_evaluator(grader.clone())
            .with_next("B"),
    );
    let b: ChallengeRef = Arc::new(
        Challenge::new("B")
            .with_setup(vec![cmd_b1.clone()])
            .with_evaluator(grader),
    );

    let mut lesson = Lesson::new(LessonDefinition {
        name: "Scenario".into(),
        setup: Vec::new(),
    });
    lesson.set_mode(mode);
    let all = vec![a.clone(), b.clone()];
    lesson.set_async_challenge_lookup(move |name| {
        futures::future::ready(all.iter().find(|c| c.name() == name).cloned())
    });

    Scenario {
        handler,
        pipeline,
        kernel,
        lesson: lesson.into_shared(),
        a,
        b,
        cmd_a1,
        cmd_a2,
        cmd_b1,
    }
}

/// Runs the bootstrap sequence and installs the middleware.
async fn bootstrap(s: &Scenario) {
    initialize_lesson(s.kernel.as_ref(), &s.lesson)
        .await
        .expect("lesson setup failed");
    s.lesson.lock().await.start_challenge(Some(s.a.clone()));
    bootstrap_environment(s.kernel.as_ref(), &s.lesson, &Config::default())
        .await
        .expect("bootstrap failed");
    initialize_challenge(s.kernel.as_ref(), Some(&s.a))
        .await
        .expect("challenge initialization failed");
    s.kernel.add_middleware(Arc::new(ProgressionMiddleware::new(
        s.lesson.clone(),
        &s.kernel,
        Arc::new(MarkdownRender),
    )));
}

fn executed_ids(handler: &RecordingHandler) -> Vec<CommandId> {
    handler.executed().iter().map(Command::id).collect()
}

fn drain(rx: &mut Receiver<KernelEvent>) -> Vec<KernelEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let s = scenario(LessonMode::Teacher);

    bootstrap(&s).await;
    assert_eq!(executed_ids(&s.handler), vec![s.cmd_a1.id(), s.cmd_a2.id()]);
    assert!(s.a.is_setup());
    assert!(!s.b.is_setup());

    let submission = Command::submit_code("solve()");
    let events = s
        .pipeline
        .send(submission.clone())
        .await
        .expect("submission failed");

    assert_eq!(
        executed_ids(&s.handler),
        vec![s.cmd_a1.id(), s.cmd_a2.id(), submission.id(), s.cmd_b1.id()]
    );
    assert!(s.b.is_setup());
    assert!(s.b.is_revealed());

    let displays: Vec<&KernelEvent> = events
        .iter()
        .filter(|e| e.displayed_value().is_some())
        .collect();
    assert_eq!(displays.len(), 1);
    assert_eq!(displays[0].command, submission.id());
    let shown = displays[0].displayed_value().expect("display value");
    assert_eq!(shown.mime_type, "text/markdown");
    assert!(shown.value.contains("Challenge complete"));

    let lesson = s.lesson.lock().await;
    let current = lesson.current_challenge().expect("active challenge");
    assert!(Arc::ptr_eq(current, &s.b));
}

#[tokio::test]
async fn test_next_challenge_initialized_before_submission_completes() {
    let s = scenario(LessonMode::Teacher);
    bootstrap(&s).await;
    let mut rx = s.pipeline.events().subscribe();

    let submission = Command::submit_code("solve()");
    s.pipeline
        .send(submission.clone())
        .await
        .expect("submission failed");

    let events = drain(&mut rx);
    let b1_done = events
        .iter()
        .position(|e| e.command == s.cmd_b1.id() && e.event_name() == "command_succeeded")
        .expect("B setup completed");
    let submission_done = events
        .iter()
        .position(|e| e.command == submission.id() && e.event_name() == "command_succeeded")
        .expect("submission completed");
    let display = events
        .iter()
        .position(|e| e.command == submission.id() && e.displayed_value().is_some())
        .expect("evaluation displayed");

    assert!(display < b1_done);
    assert!(b1_done < submission_done);
    assert_eq!(submission_done, events.len() - 1);
}

#[tokio::test]
async fn test_setup_commands_never_evaluated() {
    let s = scenario(LessonMode::Teacher);
    bootstrap(&s).await;

    for command in [s.cmd_a1.clone(), s.cmd_a2.clone()] {
        let events = s.pipeline.send(command).await.expect("setup resend failed");
        assert!(events.iter().all(|e| e.displayed_value().is_none()));
    }
    assert!(s.a.current_evaluation().is_none());

    let failing = Command::submit_code("guess()");
    let events = s.pipeline.send(failing).await.expect("submission failed");
    assert_eq!(
        events.iter().filter(|e| e.displayed_value().is_some()).count(),
        1
    );
    assert!(s.a.current_evaluation().is_some());
}

#[tokio::test]
async fn test_setup_runs_once_across_activations() {
    let s = scenario(LessonMode::Teacher);

    initialize_challenge(s.kernel.as_ref(), Some(&s.a))
        .await
        .expect("first activation failed");
    initialize_challenge(s.kernel.as_ref(), Some(&s.a))
        .await
        .expect("second activation failed");

    assert_eq!(
        executed_ids(&s.handler),
        vec![s.cmd_a1.id(), s.cmd_a2.id(), s.cmd_a2.id()]
    );
}

#[tokio::test]
async fn test_teacher_reset_gives_fresh_challenges() {
    let s = scenario(LessonMode::Teacher);
    bootstrap(&s).await;
    let mut lesson = s.lesson.lock().await;

    lesson.reset_challenge();
    let first = lesson.current_challenge().expect("fresh challenge").clone();
    lesson.reset_challenge();
    let second = lesson.current_challenge().expect("fresh challenge").clone();

    assert!(!Arc::ptr_eq(&first, &s.a));
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!first.is_setup() && !first.is_revealed());
    assert!(!second.is_setup() && !second.is_revealed());
}

#[tokio::test]
async fn test_student_reset_keeps_progress() {
    let s = scenario(LessonMode::Student);
    bootstrap(&s).await;
    let mut lesson = s.lesson.lock().await;

    lesson.reset_challenge();

    let current = lesson.current_challenge().expect("active challenge");
    assert!(Arc::ptr_eq(current, &s.a));
    assert!(current.is_setup());
    assert!(current.is_revealed());
}

#[tokio::test]
async fn test_unknown_challenge_name_is_ignored() {
    let s = scenario(LessonMode::Teacher);
    bootstrap(&s).await;
    let mut lesson = s.lesson.lock().await;

    lesson.start_challenge_named("does-not-exist").await;

    let current = lesson.current_challenge().expect("active challenge");
    assert!(Arc::ptr_eq(current, &s.a));
}

#[tokio::test]
async fn test_lesson_is_bound_into_environment() {
    let s = scenario(LessonMode::Teacher);
    bootstrap(&s).await;

    let bound = s
        .pipeline
        .variable_as::<tokio::sync::Mutex<Lesson>>("Lesson")
        .expect("lesson variable bound");
    assert!(Arc::ptr_eq(&bound, &s.lesson));
    assert_eq!(bound.lock().await.name(), "Scenario");
}

#[tokio::test]
async fn test_failed_execution_does_not_advance() {
    let s = scenario(LessonMode::Teacher);
    bootstrap(&s).await;
    s.handler.fail_on("solve()");

    let result = s.pipeline.send(Command::submit_code("solve()")).await;

    assert!(result.is_err());
    assert!(!s.b.is_setup());
    assert!(s.a.current_evaluation().is_none());
    let lesson = s.lesson.lock().await;
    assert!(Arc::ptr_eq(
        lesson.current_challenge().expect("active challenge"),
        &s.a
    ));
}
