//! Diagnostic events emitted while a message is dispatched.
//!
//! Sinks observe the search; they never influence it.

use std::sync::Mutex;

use tracing::{debug, info};

use crate::engine::{ContextRef, RuleRef};

/// One step of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    DispatchStarted {
        message_id: String,
        contexts: usize,
    },
    NoContextMatched {
        message_id: String,
    },
    ContextEntered {
        message_id: String,
        context: ContextRef,
        rules: usize,
    },
    RuleAttempted {
        message_id: String,
        rule: RuleRef,
    },
    RuleRejected {
        message_id: String,
        rule: RuleRef,
    },
    RuleMatched {
        message_id: String,
        rule: RuleRef,
    },
    HandlerInvoked {
        message_id: String,
        rule: RuleRef,
    },
    HandlerCompleted {
        message_id: String,
        rule: RuleRef,
        /// False when the handler's producer finished without a value.
        emitted: bool,
    },
    ContextExhausted {
        message_id: String,
        context: ContextRef,
    },
}

impl TraceEvent {
    pub fn message_id(&self) -> &str {
        match self {
            Self::DispatchStarted { message_id, .. }
            | Self::NoContextMatched { message_id }
            | Self::ContextEntered { message_id, .. }
            | Self::RuleAttempted { message_id, .. }
            | Self::RuleRejected { message_id, .. }
            | Self::RuleMatched { message_id, .. }
            | Self::HandlerInvoked { message_id, .. }
            | Self::HandlerCompleted { message_id, .. }
            | Self::ContextExhausted { message_id, .. } => message_id,
        }
    }
}

/// Receiver for [`TraceEvent`]s. Injected into the engine so callers choose
/// where diagnostics go.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: &TraceEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, event: &TraceEvent) {
        match event {
            TraceEvent::DispatchStarted {
                message_id,
                contexts,
            } => {
                debug!(message_id = %message_id, contexts, "dispatching message");
            },
            TraceEvent::NoContextMatched { message_id } => {
                debug!(message_id = %message_id, "no context matched");
            },
            TraceEvent::ContextEntered {
                message_id,
                context,
                rules,
            } => {
                debug!(message_id = %message_id, context = %context, rules, "context entered");
            },
            TraceEvent::RuleAttempted { message_id, rule } => {
                debug!(message_id = %message_id, rule = %rule, "running rule");
            },
            TraceEvent::RuleRejected { message_id, rule } => {
                debug!(message_id = %message_id, rule = %rule, "rule did not match");
            },
            TraceEvent::RuleMatched { message_id, rule } => {
                info!(message_id = %message_id, rule = %rule, "rule matched");
            },
            TraceEvent::HandlerInvoked { message_id, rule } => {
                debug!(message_id = %message_id, rule = %rule, "calling handler");
            },
            TraceEvent::HandlerCompleted {
                message_id,
                rule,
                emitted,
            } => {
                debug!(message_id = %message_id, rule = %rule, emitted, "handler completed");
            },
            TraceEvent::ContextExhausted {
                message_id,
                context,
            } => {
                info!(message_id = %message_id, context = %context, "no rule matched in context");
            },
        }
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn record(&self, _event: &TraceEvent) {}
}

/// Keeps events in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drain recorded events, leaving the sink empty.
    pub fn take(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl TraceSink for RecordingSink {
    fn record(&self, event: &TraceEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
