//! Inbound message record and the argument payload recognizers produce.

use serde::{Deserialize, Serialize};

/// Key/value payload a recognizer hands to its paired handler.
///
/// No schema is enforced. An empty map still counts as a match; only the
/// absence of a value (`None`) means "not recognized".
pub type Args = serde_json::Map<String, serde_json::Value>;

/// An inbound conversational message, normalized from whatever channel it
/// arrived on. Passed unmodified to every recognizer and handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Channel identifier (e.g. "console", "telegram").
    pub channel: String,
    /// Sender identifier on that channel.
    pub from: String,
    pub text: String,
    /// Structured payload (button clicks, card submissions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Message {
    /// A plain text message with a fresh id.
    pub fn text(channel: impl Into<String>, from: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel: channel.into(),
            from: from.into(),
            text: text.into(),
            value: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Text with surrounding whitespace removed and lowercased, for keyword matching.
    pub fn normalized_text(&self) -> String {
        self.text.trim().to_lowercase()
    }
}
