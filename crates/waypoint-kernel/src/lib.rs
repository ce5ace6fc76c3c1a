//! Waypoint Kernel
//!
//! Command execution substrate for guided lessons.
//!
//! This crate defines what the lesson engine needs from the environment that
//! runs code: commands with stable identity, the events they produce, a
//! middleware pipeline around execution, directives, and variable binding.
//! [`Pipeline`] implements all of it in-process.

mod command;
mod event;
mod kernel;
mod pipeline;

pub use command::{Command, CommandId, CommandKind};
pub use event::{EventBus, EventKind, FormattedValue, KernelEvent};
pub use kernel::{
    parse_directive, CommandHandler, Directive, Kernel, KernelInvocationContext, KernelMiddleware,
    Next,
};
pub use pipeline::{Pipeline, RecordingHandler, Variable};

use thiserror::Error;

/// Boxed error carried across the kernel boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while executing commands.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The host failed to execute a command.
    #[error("command {command} failed: {message}")]
    CommandFailed {
        /// The failing command.
        command: CommandId,
        /// Description of the failure.
        message: String,
    },

    /// A middleware stage failed after or instead of executing the command.
    #[error("middleware failed: {0}")]
    MiddlewareFailed(#[source] BoxError),

    /// A directive failed.
    #[error("directive '{directive}' failed: {source}")]
    DirectiveFailed {
        /// Name of the directive.
        directive: String,
        /// The underlying failure.
        #[source]
        source: BoxError,
    },

    /// A submission named a directive that is not registered.
    #[error("unknown directive '{0}'")]
    UnknownDirective(String),

    /// The kernel was dropped while a component still referred to it.
    #[error("kernel is no longer available")]
    KernelUnavailable,
}

impl KernelError {
    /// Creates a new `CommandFailed` error.
    #[must_use]
    pub fn command_failed(command: CommandId, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command,
            message: message.into(),
        }
    }

    /// Wraps a middleware failure.
    #[must_use]
    pub fn middleware(error: impl Into<BoxError>) -> Self {
        Self::MiddlewareFailed(error.into())
    }

    /// Wraps a directive failure.
    #[must_use]
    pub fn directive(directive: impl Into<String>, error: impl Into<BoxError>) -> Self {
        Self::DirectiveFailed {
            directive: directive.into(),
            source: error.into(),
        }
    }
}
