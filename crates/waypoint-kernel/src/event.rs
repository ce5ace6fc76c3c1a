//! Kernel event types and broadcasting.
//!
//! Events are produced while a command executes. Each event is attributed to
//! the command that caused it. The pipeline records the events of a command
//! in its [`KernelInvocationContext`](crate::KernelInvocationContext) and
//! fans every event out on an [`EventBus`] for observers such as a transcript
//! printer.
//!
//! # Event Types
//!
//! - `standard_output` / `standard_error` - text written by executed code
//! - `return_value_produced` - value of the last expression
//! - `displayed_value_produced` - formatted value published for display
//! - `command_succeeded` / `command_failed` - completion of a command

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::CommandId;

// ============================================================================
// Payloads
// ============================================================================

/// A value rendered for display, tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedValue {
    /// MIME type of `value` (e.g. `text/markdown`).
    pub mime_type: String,
    /// The rendered representation.
    pub value: String,
}

impl FormattedValue {
    /// Creates a new formatted value.
    #[must_use]
    pub fn new(mime_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            value: value.into(),
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    /// Text written to standard output.
    StandardOutput(String),
    /// Text written to standard error.
    StandardError(String),
    /// The value produced by the executed code.
    ReturnValueProduced(String),
    /// A value published for display.
    DisplayedValueProduced(FormattedValue),
    /// The command completed successfully.
    CommandSucceeded,
    /// The command failed.
    CommandFailed {
        /// Failure description.
        message: String,
    },
}

/// An event produced while executing a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelEvent {
    /// The command this event is attributed to.
    pub command: CommandId,
    /// The event payload.
    pub kind: EventKind,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
}

impl KernelEvent {
    /// Creates an event attributed to `command` with the current timestamp.
    #[must_use]
    pub fn new(command: CommandId, kind: EventKind) -> Self {
        Self {
            command,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self.kind {
            EventKind::StandardOutput(_) => "standard_output",
            EventKind::StandardError(_) => "standard_error",
            EventKind::ReturnValueProduced(_) => "return_value_produced",
            EventKind::DisplayedValueProduced(_) => "displayed_value_produced",
            EventKind::CommandSucceeded => "command_succeeded",
            EventKind::CommandFailed { .. } => "command_failed",
        }
    }

    /// Returns the displayed value if this is a `DisplayedValueProduced` event.
    #[must_use]
    pub const fn displayed_value(&self) -> Option<&FormattedValue> {
        match &self.kind {
            EventKind::DisplayedValueProduced(value) => Some(value),
            _ => None,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcasts kernel events to every subscriber.
///
/// Uses a tokio broadcast channel. Events are not retained for subscribers
/// that join later.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<KernelEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the specified per-subscriber buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// the overwritten events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning the number of receivers it reached.
    pub fn send(&self, event: KernelEvent) -> usize {
        // send() only fails when nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
