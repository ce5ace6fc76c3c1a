//! In-process command pipeline.
//!
//! [`Pipeline`] is a self-contained [`Kernel`]: an ordered middleware chain
//! over a terminal [`CommandHandler`], a directive table, a variable store,
//! and an [`EventBus`]. It is what the CLI runs lessons on and what the tests
//! drive, while real hosts provide their own `Kernel` implementation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use waypoint_kernel::{Command, Kernel, Pipeline, RecordingHandler};
//!
//! # tokio_test::block_on(async {
//! let handler = Arc::new(RecordingHandler::new());
//! let pipeline = Pipeline::new(handler.clone());
//!
//! pipeline.send(Command::submit_code("1 + 1")).await.unwrap();
//! assert_eq!(handler.executed_sources(), vec!["1 + 1"]);
//! # });
//! ```

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::{
    parse_directive, Command, CommandHandler, CommandKind, Directive, EventBus, EventKind, Kernel,
    KernelError, KernelEvent, KernelInvocationContext, KernelMiddleware, Next,
};

/// Shared value bound into the execution environment.
pub type Variable = Arc<dyn Any + Send + Sync>;

/// In-process [`Kernel`] implementation.
pub struct Pipeline {
    this: Weak<Pipeline>,
    handler: Arc<dyn CommandHandler>,
    middleware: RwLock<Vec<Arc<dyn KernelMiddleware>>>,
    directives: RwLock<HashMap<String, Arc<dyn Directive>>>,
    variables: RwLock<HashMap<String, Variable>>,
    bus: EventBus,
}

impl Pipeline {
    /// Creates a pipeline that executes commands with `handler`.
    #[must_use]
    pub fn new(handler: Arc<dyn CommandHandler>) -> Arc<Self> {
        Self::with_bus(handler, EventBus::default())
    }

    /// Creates a pipeline broadcasting its events on `bus`.
    #[must_use]
    pub fn with_bus(handler: Arc<dyn CommandHandler>, bus: EventBus) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            handler,
            middleware: RwLock::new(Vec::new()),
            directives: RwLock::new(HashMap::new()),
            variables: RwLock::new(HashMap::new()),
            bus,
        })
    }

    /// Registers a directive under its name, replacing any previous one.
    pub fn add_directive(&self, directive: Arc<dyn Directive>) {
        let name = directive.name().to_string();
        debug!(directive = %name, "Registering directive");
        self.directives
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, directive);
    }

    /// Returns the value bound under `name`.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns the value bound under `name` if it has type `T`.
    #[must_use]
    pub fn variable_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.variable(name)?.downcast::<T>().ok()
    }

    /// Number of installed middleware stages.
    #[must_use]
    pub fn middleware_count(&self) -> usize {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The bus every event of this pipeline is broadcast on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.bus
    }

    fn directive(&self, name: &str) -> Option<Arc<dyn Directive>> {
        self.directives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.middleware_count())
            .field("subscribers", &self.bus.receiver_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Kernel for Pipeline {
    #[instrument(level = "debug", skip_all, fields(command = %command.id(), kind = command.kind().name()))]
    async fn send(&self, command: Command) -> Result<Vec<KernelEvent>, KernelError> {
        // Snapshot the chain so stages may re-enter `send` or install
        // middleware while this command is in flight.
        let chain = self
            .middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let terminal = Terminal { pipeline: self };
        let mut context = KernelInvocationContext::with_bus(command.clone(), self.bus.clone());

        match Next::new(&chain, &terminal).run(&command, &mut context).await {
            Ok(()) => {
                context.publish(EventKind::CommandSucceeded);
                Ok(context.into_events())
            }
            Err(e) => {
                warn!(error = %e, "Command failed");
                context.publish(EventKind::CommandFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn add_middleware(&self, middleware: Arc<dyn KernelMiddleware>) {
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
    }

    async fn set_variable(&self, name: &str, value: Variable) -> Result<(), KernelError> {
        debug!(variable = %name, "Binding variable");
        self.variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
        Ok(())
    }
}

/// Final stage: dispatches directives, hands everything else to the handler.
struct Terminal<'a> {
    pipeline: &'a Pipeline,
}

#[async_trait]
impl CommandHandler for Terminal<'_> {
    async fn handle(
        &self,
        command: &Command,
        context: &mut KernelInvocationContext,
    ) -> Result<(), KernelError> {
        let Some((name, argument)) = command.code().and_then(parse_directive) else {
            return self.pipeline.handler.handle(command, context).await;
        };

        let directive = self
            .pipeline
            .directive(name)
            .ok_or_else(|| KernelError::UnknownDirective(name.to_string()))?;
        let kernel: Arc<dyn Kernel> = self
            .pipeline
            .this
            .upgrade()
            .ok_or(KernelError::KernelUnavailable)?;

        debug!(directive = %name, %argument, "Invoking directive");
        directive.invoke(kernel, argument).await
    }
}

// ============================================================================
// Recording Handler
// ============================================================================

/// Terminal handler that records every command it executes.
///
/// Submissions echo their code as a `ReturnValueProduced` event. Submissions
/// whose code was registered with [`RecordingHandler::fail_on`] fail with
/// [`KernelError::CommandFailed`] after being recorded.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    executed: Mutex<Vec<Command>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingHandler {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future submission of exactly `code` fail.
    pub fn fail_on(&self, code: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.into());
    }

    /// Stops failing submissions of `code`.
    pub fn clear_failure(&self, code: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(code);
    }

    /// Every command executed so far, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<Command> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The source text of every executed command, in order.
    #[must_use]
    pub fn executed_sources(&self) -> Vec<String> {
        self.executed()
            .iter()
            .map(|command| match command.kind() {
                CommandKind::SubmitCode { code } | CommandKind::SendEditableCode { code, .. } => {
                    code.clone()
                }
                CommandKind::DisplayMarkdown { markdown } => markdown.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl CommandHandler for RecordingHandler {
    async fn handle(
        &self,
        command: &Command,
        context: &mut KernelInvocationContext,
    ) -> Result<(), KernelError> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());

        if let Some(code) = command.code() {
            let fails = self
                .failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(code);
            if fails {
                return Err(KernelError::command_failed(
                    command.id(),
                    format!("execution of '{code}' failed"),
                ));
            }
            context.publish(EventKind::ReturnValueProduced(code.to_string()));
        }
        Ok(())
    }
}
