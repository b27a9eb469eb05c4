//! Inbound events.
//!
//! Events arrive already normalized by the messenger: platform payloads,
//! signatures and event types the engine does not handle never get here.

use botdock_core::{Message, UserId};
use serde::{Deserialize, Serialize};

/// Kind of inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// The user typed something.
    Message,
    /// The user tapped a button.
    Postback,
}

/// A normalized inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Sender.
    pub user_id: UserId,
    /// Typed text, for message events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Button payload, for postback events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Event {
    /// Creates a message event.
    #[must_use]
    pub fn message(user_id: impl Into<UserId>, text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Message,
            user_id: user_id.into(),
            text: Some(text.into()),
            payload: None,
        }
    }

    /// Creates a postback event.
    #[must_use]
    pub fn postback(user_id: impl Into<UserId>, payload: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Postback,
            user_id: user_id.into(),
            text: None,
            payload: Some(payload.into()),
        }
    }

    /// The user's input: the payload for postbacks, the text for messages,
    /// falling back to whichever is present.
    #[must_use]
    pub fn input(&self) -> &str {
        let (primary, secondary) = match self.kind {
            EventKind::Postback => (&self.payload, &self.text),
            EventKind::Message => (&self.text, &self.payload),
        };
        primary.as_deref().or(secondary.as_deref()).unwrap_or_default()
    }

    /// The input as a history entry, or `None` for empty input.
    #[must_use]
    pub fn as_message(&self) -> Option<Message> {
        let input = self.input();
        (!input.is_empty()).then(|| Message::text(input))
    }
}
