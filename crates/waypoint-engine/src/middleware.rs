//! The progression middleware.
//!
//! Installed into the kernel pipeline once a lesson has started, it turns
//! every learner submission into an evaluation against the active challenge
//! and drives the lesson forward when an evaluation asks it to.
//!
//! For each `SubmitCode` command:
//!
//! 1. Directives, and setup commands (see [`Lesson::is_setup_command`]),
//!    are executed and nothing else happens.
//! 2. Otherwise the command is executed, then the challenge that was active
//!    *before* execution evaluates the submitted code against the events the
//!    execution produced. The rendered result is published as a display
//!    event attributed to the submission.
//! 3. If evaluation changed the active challenge, the new challenge is
//!    initialized before the submission completes.
//!
//! Other command kinds pass through untouched, as does everything while no
//! lesson is attached.
//!
//! [`Lesson::is_setup_command`]: crate::Lesson::is_setup_command

use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use waypoint_kernel::{
    parse_directive, Command, CommandKind, EventKind, Kernel, KernelError,
    KernelInvocationContext, KernelMiddleware, Next,
};

use crate::lesson::SharedLesson;
use crate::render::Render;
use crate::session::initialize_challenge;

/// Pipeline stage that evaluates submissions and advances the lesson.
pub struct ProgressionMiddleware {
    lesson: RwLock<Option<SharedLesson>>,
    kernel: Weak<dyn Kernel>,
    renderer: Arc<dyn Render>,
}

impl ProgressionMiddleware {
    /// Creates a middleware driving `lesson`.
    ///
    /// `kernel` is the kernel the middleware is installed into; it is used
    /// to send initialization commands when the lesson advances.
    #[must_use]
    pub fn new(lesson: SharedLesson, kernel: &Arc<dyn Kernel>, renderer: Arc<dyn Render>) -> Self {
        Self {
            lesson: RwLock::new(Some(lesson)),
            kernel: Arc::downgrade(kernel),
            renderer,
        }
    }

    /// The lesson this middleware drives, if one is attached.
    #[must_use]
    pub fn lesson(&self) -> Option<SharedLesson> {
        self.lesson
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes `lesson` the lesson this middleware drives.
    pub fn attach(&self, lesson: SharedLesson) {
        *self.lesson.write().unwrap_or_else(PoisonError::into_inner) = Some(lesson);
    }

    /// Stops driving the current lesson and returns it.
    ///
    /// Until a lesson is attached again every command passes through.
    pub fn detach(&self) -> Option<SharedLesson> {
        self.lesson
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Returns `true` if this middleware was created for `kernel`.
    #[must_use]
    pub fn is_installed_in(&self, kernel: &Arc<dyn Kernel>) -> bool {
        Weak::ptr_eq(&self.kernel, &Arc::downgrade(kernel))
    }

    #[instrument(level = "debug", skip_all, fields(command = %command.id()))]
    async fn evaluate_submission(
        &self,
        command: &Command,
        code: &str,
        context: &mut KernelInvocationContext,
        next: Next<'_>,
    ) -> Result<(), KernelError> {
        if parse_directive(code).is_some() {
            debug!("Directive, skipping evaluation");
            return next.run(command, context).await;
        }

        let Some(lesson) = self.lesson() else {
            debug!("No lesson attached, skipping evaluation");
            return next.run(command, context).await;
        };

        let (is_setup, before) = {
            let lesson = lesson.lock().await;
            (
                lesson.is_setup_command(command),
                lesson.current_challenge().cloned(),
            )
        };

        if is_setup {
            debug!("Setup command, skipping evaluation");
            return next.run(command, context).await;
        }

        let Some(before) = before else {
            debug!("No active challenge, skipping evaluation");
            return next.run(command, context).await;
        };

        next.run(command, context).await?;

        let events = context.events().to_vec();
        let result = before.evaluate(code, &events, &lesson).await?;
        let after = lesson.lock().await.current_challenge().cloned();

        let rendered = self.renderer.render(&result);
        context.publish_for(command, EventKind::DisplayedValueProduced(rendered));

        let advanced = match &after {
            Some(after) => !Arc::ptr_eq(after, &before),
            None => true,
        };
        if advanced {
            info!(
                from = %before.name(),
                to = after.as_ref().map_or("", |c| c.name()),
                "Lesson advanced"
            );
            let kernel = self.kernel.upgrade().ok_or(KernelError::KernelUnavailable)?;
            initialize_challenge(kernel.as_ref(), after.as_ref()).await?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for ProgressionMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressionMiddleware")
            .field("kernel_alive", &(self.kernel.strong_count() > 0))
            .field("attached", &self.lesson().is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KernelMiddleware for ProgressionMiddleware {
    async fn invoke(
        &self,
        command: &Command,
        context: &mut KernelInvocationContext,
        next: Next<'_>,
    ) -> Result<(), KernelError> {
        match command.kind() {
            CommandKind::SubmitCode { code } => {
                self.evaluate_submission(command, code, context, next).await
            }
            CommandKind::SendEditableCode { .. } | CommandKind::DisplayMarkdown { .. } => {
                next.run(command, context).await
            }
        }
    }
}
