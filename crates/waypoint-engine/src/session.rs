//! Lesson session wiring: challenge initialization, bootstrap, and the
//! `#!start-lesson` directive.
//!
//! Starting a lesson runs, in order:
//!
//! 1. load and parse the lesson document (failures leave the kernel untouched);
//! 2. lesson-wide setup;
//! 3. activation of the first challenge;
//! 4. environment bootstrap: reference submissions, then binding the lesson
//!    into the execution environment;
//! 5. initialization of the first challenge;
//! 6. installation of the [`ProgressionMiddleware`], or attaching the lesson
//!    to the one already installed by an earlier `#!start-lesson`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use waypoint_kernel::{Command, Directive, Kernel, KernelError, Variable};

use crate::challenge::{set_default_progression, Challenge, ChallengeRef};
use crate::config::Config;
use crate::document::LessonDocument;
use crate::error::Result;
use crate::evaluation::Evaluator;
use crate::lesson::{Lesson, SharedLesson};
use crate::middleware::ProgressionMiddleware;
use crate::parser::{LessonParser, MarkdownLessonParser};
use crate::render::Render;

/// Name of the directive that starts a lesson.
pub const START_LESSON_DIRECTIVE: &str = "#!start-lesson";

// ============================================================================
// Initialization
// ============================================================================

async fn send_all(
    kernel: &dyn Kernel,
    commands: &[Command],
) -> std::result::Result<(), KernelError> {
    for command in commands {
        debug!(command = %command.id(), kind = command.kind().name(), "Sending");
        kernel.send(command.clone()).await?;
    }
    Ok(())
}

/// Activates `challenge` in the execution environment.
///
/// The first time, the challenge's setup commands are sent; after that only
/// its contents and environment setup are. Commands are sent one at a time,
/// each awaited before the next.
///
/// A failure partway through setup leaves the challenge marked as not set
/// up, so the next initialization sends the whole setup again.
///
/// # Errors
///
/// Returns the first failure reported by the kernel.
pub async fn initialize_challenge(
    kernel: &dyn Kernel,
    challenge: Option<&ChallengeRef>,
) -> std::result::Result<(), KernelError> {
    let Some(challenge) = challenge else {
        return Ok(());
    };

    if !challenge.is_setup() {
        debug!(
            challenge = %challenge.name(),
            count = challenge.setup().len(),
            "Running challenge setup"
        );
        send_all(kernel, challenge.setup()).await?;
        challenge.mark_setup();
    }
    send_all(kernel, challenge.contents()).await?;
    send_all(kernel, challenge.environment_setup()).await?;

    info!(challenge = %challenge.name(), "Challenge initialized");
    Ok(())
}

/// Sends the lesson-wide setup commands.
///
/// # Errors
///
/// Returns the first failure reported by the kernel.
pub async fn initialize_lesson(
    kernel: &dyn Kernel,
    lesson: &SharedLesson,
) -> std::result::Result<(), KernelError> {
    let setup = lesson.lock().await.setup().to_vec();
    send_all(kernel, &setup).await
}

/// Prepares the execution environment for a lesson.
///
/// Submits each configured reference, then binds `lesson` under the
/// configured lesson variable name.
///
/// # Errors
///
/// Returns the first failure reported by the kernel.
pub async fn bootstrap_environment(
    kernel: &dyn Kernel,
    lesson: &SharedLesson,
    config: &Config,
) -> std::result::Result<(), KernelError> {
    for reference in &config.references {
        debug!(%reference, "Submitting reference");
        kernel.send(Command::submit_code(reference.as_str())).await?;
    }

    let value: Variable = lesson.clone();
    kernel.set_variable(&config.lesson_variable, value).await
}

// ============================================================================
// Starting a lesson
// ============================================================================

/// Everything [`start_lesson`] needs besides the kernel and the path.
#[derive(Clone)]
pub struct StartOptions {
    /// Session configuration.
    pub config: Config,
    /// Renders evaluation results for display.
    pub renderer: Arc<dyn Render>,
    /// Grading logic by challenge name.
    pub evaluators: HashMap<String, Arc<dyn Evaluator>>,
    /// Grading logic for challenges without an entry in `evaluators`.
    pub default_evaluator: Option<Arc<dyn Evaluator>>,
    /// Turns lesson documents into blueprints.
    pub parser: Arc<dyn LessonParser>,
}

impl StartOptions {
    /// Creates options with the renderer and parser `config` selects.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            renderer: config.render_format.renderer(),
            parser: Arc::new(MarkdownLessonParser::new(config.default_language.clone())),
            evaluators: HashMap::new(),
            default_evaluator: None,
            config,
        }
    }

    /// Registers grading logic for the challenge named `challenge`.
    #[must_use]
    pub fn with_evaluator(
        mut self,
        challenge: impl Into<String>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        self.evaluators.insert(challenge.into(), evaluator);
        self
    }

    /// Sets the grading logic used when a challenge has no registered one.
    #[must_use]
    pub fn with_default_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.default_evaluator = Some(evaluator);
        self
    }

    /// Replaces the renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn Render>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replaces the document parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn LessonParser>) -> Self {
        self.parser = parser;
        self
    }

    fn evaluator_for(&self, challenge: &str) -> Option<Arc<dyn Evaluator>> {
        self.evaluators
            .get(challenge)
            .or(self.default_evaluator.as_ref())
            .cloned()
    }
}

impl Default for StartOptions {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut evaluators: Vec<&String> = self.evaluators.keys().collect();
        evaluators.sort();
        f.debug_struct("StartOptions")
            .field("config", &self.config)
            .field("evaluators", &evaluators)
            .field("default_evaluator", &self.default_evaluator.is_some())
            .finish_non_exhaustive()
    }
}

/// A lesson built from its document, not yet started on any kernel.
struct PreparedLesson {
    lesson: SharedLesson,
    first: Option<ChallengeRef>,
}

/// Loads, parses and assembles the lesson at `path`. Touches no kernel.
fn prepare_lesson(path: &Path, options: &StartOptions) -> Result<PreparedLesson> {
    let config = &options.config;
    let document = LessonDocument::load(path, config.max_document_size)?;
    let parsed = options.parser.parse(&document)?;

    for name in options.evaluators.keys() {
        if !parsed.challenges.iter().any(|c| &c.name == name) {
            warn!(challenge = %name, "Evaluator registered for unknown challenge");
        }
    }

    let mut challenges: Vec<Challenge> = parsed
        .challenges
        .iter()
        .map(|blueprint| {
            let mut challenge = blueprint.to_challenge();
            if let Some(evaluator) = options.evaluator_for(&blueprint.name) {
                challenge.set_evaluator(evaluator);
            }
            challenge
        })
        .collect();
    set_default_progression(&mut challenges);
    let challenges: Arc<[ChallengeRef]> = challenges.into_iter().map(Arc::new).collect();
    let first = challenges.first().cloned();

    let mut lesson = Lesson::new(parsed.lesson.to_definition());
    lesson.set_mode(config.mode);
    let lookup = Arc::clone(&challenges);
    lesson.set_challenge_lookup(move |name| lookup.iter().find(|c| c.name() == name).cloned());

    info!(
        lesson = %parsed.lesson.name,
        challenges = challenges.len(),
        mode = %config.mode,
        "Starting lesson"
    );

    Ok(PreparedLesson {
        lesson: lesson.into_shared(),
        first,
    })
}

/// Runs lesson setup, activates the first challenge, bootstraps the
/// environment and initializes the first challenge.
async fn launch(
    kernel: &dyn Kernel,
    prepared: &PreparedLesson,
    config: &Config,
) -> std::result::Result<(), KernelError> {
    initialize_lesson(kernel, &prepared.lesson).await?;
    prepared
        .lesson
        .lock()
        .await
        .start_challenge(prepared.first.clone());
    bootstrap_environment(kernel, &prepared.lesson, config).await?;
    initialize_challenge(kernel, prepared.first.as_ref()).await
}

/// Loads the lesson at `path` and starts it on `kernel`.
///
/// Returns the running lesson, which is also bound into the kernel under the
/// configured lesson variable. Every call installs a new
/// [`ProgressionMiddleware`]; use [`StartLessonDirective`] to switch lessons
/// on a kernel that already runs one.
///
/// # Errors
///
/// Document errors are returned before anything is sent to the kernel.
/// Kernel failures during setup are returned as they occur, without rolling
/// back the commands already sent.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn start_lesson(
    kernel: &Arc<dyn Kernel>,
    path: &Path,
    options: &StartOptions,
) -> Result<SharedLesson> {
    let prepared = prepare_lesson(path, options)?;
    launch(kernel.as_ref(), &prepared, &options.config).await?;

    kernel.add_middleware(Arc::new(ProgressionMiddleware::new(
        prepared.lesson.clone(),
        kernel,
        options.renderer.clone(),
    )));

    Ok(prepared.lesson)
}

#[derive(Debug, Default)]
struct Session {
    lesson: Option<SharedLesson>,
    middleware: Option<Arc<ProgressionMiddleware>>,
}

/// The `#!start-lesson <path>` directive.
///
/// Relative paths are resolved against the base directory, when one is set.
/// The most recently started lesson stays reachable through
/// [`StartLessonDirective::lesson`].
///
/// The directive installs one [`ProgressionMiddleware`] per kernel. Starting
/// another lesson detaches the running one before any of the new lesson's
/// commands are sent, and attaches the new lesson once it has started. If
/// the new lesson fails while starting, no lesson is attached.
#[derive(Debug)]
pub struct StartLessonDirective {
    options: StartOptions,
    base_dir: Option<PathBuf>,
    session: Mutex<Session>,
}

impl StartLessonDirective {
    /// Creates the directive.
    #[must_use]
    pub fn new(options: StartOptions) -> Self {
        Self {
            options,
            base_dir: None,
            session: Mutex::new(Session::default()),
        }
    }

    /// Resolves relative lesson paths against `dir`.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The lesson started most recently by this directive, while it runs.
    #[must_use]
    pub fn lesson(&self) -> Option<SharedLesson> {
        self.session().lesson.clone()
    }

    fn resolve(&self, argument: &str) -> PathBuf {
        let path = Path::new(argument.trim().trim_matches('"'));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Detaches the running lesson and returns the middleware installed in
    /// `kernel`, if any.
    fn suspend(&self, kernel: &Arc<dyn Kernel>) -> Option<Arc<ProgressionMiddleware>> {
        let mut session = self.session();
        let middleware = session
            .middleware
            .clone()
            .filter(|m| m.is_installed_in(kernel))?;
        if middleware.detach().is_some() {
            session.lesson = None;
            debug!("Detached running lesson");
        }
        Some(middleware)
    }
}

#[async_trait]
impl Directive for StartLessonDirective {
    fn name(&self) -> &str {
        START_LESSON_DIRECTIVE
    }

    async fn invoke(
        &self,
        kernel: Arc<dyn Kernel>,
        argument: &str,
    ) -> std::result::Result<(), KernelError> {
        if argument.trim().trim_matches('"').is_empty() {
            return Err(KernelError::directive(
                START_LESSON_DIRECTIVE,
                "missing lesson path",
            ));
        }

        let path = self.resolve(argument);
        let prepared = prepare_lesson(&path, &self.options)
            .map_err(|e| KernelError::directive(START_LESSON_DIRECTIVE, e))?;

        let installed = self.suspend(&kernel);
        launch(kernel.as_ref(), &prepared, &self.options.config)
            .await
            .map_err(|e| KernelError::directive(START_LESSON_DIRECTIVE, e))?;

        let middleware = match installed {
            Some(middleware) => {
                middleware.attach(prepared.lesson.clone());
                middleware
            }
            None => {
                let middleware = Arc::new(ProgressionMiddleware::new(
                    prepared.lesson.clone(),
                    &kernel,
                    self.options.renderer.clone(),
                ));
                kernel.add_middleware(middleware.clone());
                middleware
            }
        };

        let mut session = self.session();
        session.lesson = Some(prepared.lesson);
        session.middleware = Some(middleware);
        Ok(())
    }
}
