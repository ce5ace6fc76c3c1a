//! Contracts between the lesson engine and the host that executes commands.
//!
//! A host implements [`Kernel`]: it accepts commands, runs them through an
//! ordered chain of [`KernelMiddleware`] stages ending in a
//! [`CommandHandler`], and lets callers bind named values into the execution
//! environment.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Command, EventBus, EventKind, KernelError, KernelEvent};

// ============================================================================
// Invocation Context
// ============================================================================

/// Per-command state threaded through every pipeline stage.
///
/// Collects the events produced while the command runs. When the context is
/// attached to an [`EventBus`], each published event is broadcast as well.
#[derive(Debug)]
pub struct KernelInvocationContext {
    command: Command,
    events: Vec<KernelEvent>,
    bus: Option<EventBus>,
}

impl KernelInvocationContext {
    /// Creates a context for `command` with no broadcast.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            events: Vec::new(),
            bus: None,
        }
    }

    /// Creates a context for `command` that also broadcasts on `bus`.
    #[must_use]
    pub const fn with_bus(command: Command, bus: EventBus) -> Self {
        Self {
            command,
            events: Vec::new(),
            bus: Some(bus),
        }
    }

    /// The command this context was created for.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.command
    }

    /// Publishes an event attributed to the context's command.
    pub fn publish(&mut self, kind: EventKind) {
        let event = KernelEvent::new(self.command.id(), kind);
        self.push(event);
    }

    /// Publishes an event attributed to an arbitrary command.
    pub fn publish_for(&mut self, command: &Command, kind: EventKind) {
        let event = KernelEvent::new(command.id(), kind);
        self.push(event);
    }

    fn push(&mut self, event: KernelEvent) {
        if let Some(bus) = &self.bus {
            bus.send(event.clone());
        }
        self.events.push(event);
    }

    /// Events published so far, in order.
    #[must_use]
    pub fn events(&self) -> &[KernelEvent] {
        &self.events
    }

    /// Consumes the context, returning its events.
    #[must_use]
    pub fn into_events(self) -> Vec<KernelEvent> {
        self.events
    }
}

// ============================================================================
// Pipeline Stages
// ============================================================================

/// The terminal stage: actually executes a command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Executes `command`, publishing any produced events on `context`.
    async fn handle(
        &self,
        command: &Command,
        context: &mut KernelInvocationContext,
    ) -> Result<(), KernelError>;
}

/// A stage wrapped around command execution.
///
/// Implementations decide whether and when to call [`Next::run`]; work done
/// before the call happens before execution and work after it sees the
/// events execution produced.
#[async_trait]
pub trait KernelMiddleware: Send + Sync {
    /// Handles `command`, delegating to the remaining stages through `next`.
    async fn invoke(
        &self,
        command: &Command,
        context: &mut KernelInvocationContext,
        next: Next<'_>,
    ) -> Result<(), KernelError>;
}

/// The remaining stages of a pipeline after the current middleware.
pub struct Next<'a> {
    middleware: &'a [Arc<dyn KernelMiddleware>],
    handler: &'a dyn CommandHandler,
}

impl<'a> Next<'a> {
    /// Creates a chain of `middleware` stages ending in `handler`.
    #[must_use]
    pub const fn new(
        middleware: &'a [Arc<dyn KernelMiddleware>],
        handler: &'a dyn CommandHandler,
    ) -> Self {
        Self {
            middleware,
            handler,
        }
    }

    /// Runs the remaining stages for `command`.
    pub async fn run(
        self,
        command: &Command,
        context: &mut KernelInvocationContext,
    ) -> Result<(), KernelError> {
        match self.middleware.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    middleware: rest,
                    handler: self.handler,
                };
                stage.invoke(command, context, next).await
            }
            None => self.handler.handle(command, context).await,
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining_middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Directives
// ============================================================================

/// A named action triggered by a submission starting with the directive name.
///
/// For a submission `#!start-lesson lessons/intro.md`, the directive named
/// `#!start-lesson` is invoked with the argument `lessons/intro.md`.
#[async_trait]
pub trait Directive: Send + Sync {
    /// The directive name, including any prefix such as `#!`.
    fn name(&self) -> &str;

    /// Runs the directive against `kernel`.
    async fn invoke(&self, kernel: Arc<dyn Kernel>, argument: &str) -> Result<(), KernelError>;
}

/// Splits a submission into a directive name and its argument.
///
/// Returns `None` unless the first non-blank token starts with `#!`.
///
/// # Examples
///
/// ```
/// use waypoint_kernel::parse_directive;
///
/// assert_eq!(
///     parse_directive("#!start-lesson intro.md"),
///     Some(("#!start-lesson", "intro.md"))
/// );
/// assert_eq!(parse_directive("let x = 1;"), None);
/// ```
#[must_use]
pub fn parse_directive(code: &str) -> Option<(&str, &str)> {
    let code = code.trim();
    if !code.starts_with("#!") {
        return None;
    }
    match code.split_once(char::is_whitespace) {
        Some((name, argument)) => Some((name, argument.trim())),
        None => Some((code, "")),
    }
}

// ============================================================================
// Kernel
// ============================================================================

/// A command execution substrate.
#[async_trait]
pub trait Kernel: Send + Sync {
    /// Sends `command` through the full pipeline and waits for completion.
    ///
    /// Returns the events produced while the command ran.
    async fn send(&self, command: Command) -> Result<Vec<KernelEvent>, KernelError>;

    /// Appends a middleware stage to the command pipeline.
    fn add_middleware(&self, middleware: Arc<dyn KernelMiddleware>);

    /// Binds `value` under `name` in the execution environment.
    async fn set_variable(
        &self,
        name: &str,
        value: Arc<dyn Any + Send + Sync>,
    ) -> Result<(), KernelError>;
}
