use std::{error::Error as StdError, time::Duration};

use crate::engine::RuleRef;

/// Crate-wide result type for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Faults raised while dispatching a message.
///
/// A message nobody recognizes is not an error; see [`crate::Unhandled`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A recognizer failed synchronously or its first emission was an error.
    #[error("recognizer for {rule} failed")]
    Recognizer {
        rule: RuleRef,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The selected handler failed before producing its first result.
    #[error("handler for {rule} failed")]
    Handler {
        rule: RuleRef,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The dispatch did not finish within the configured limit.
    #[error("dispatch of message {message_id} timed out after {after:?}")]
    Timeout { message_id: String, after: Duration },
}

impl Error {
    #[must_use]
    pub fn recognizer(rule: RuleRef, source: anyhow::Error) -> Self {
        Self::Recognizer {
            rule,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn handler(rule: RuleRef, source: anyhow::Error) -> Self {
        Self::Handler {
            rule,
            source: source.into(),
        }
    }

    /// The rule whose recognizer or handler faulted, if any.
    pub fn rule(&self) -> Option<&RuleRef> {
        match self {
            Self::Recognizer { rule, .. } | Self::Handler { rule, .. } => Some(rule),
            Self::Timeout { .. } => None,
        }
    }
}
