//! Platform-agnostic message descriptors.
//!
//! The engine never produces platform payloads. It emits these descriptors
//! and the messenger compiles them for LINE, Facebook, Viber and friends.

use serde::{Deserialize, Serialize};

/// Who produced a message in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The chat user.
    User,
    /// The bot.
    Bot,
}

/// A single outgoing or recorded message.
///
/// Every variant carries `text`, so `message.text` is always addressable in
/// the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Plain text.
    Text {
        /// Message body.
        text: String,
    },
    /// Text with quick-reply options; choosing one sends its label back as a
    /// postback.
    Buttons {
        /// Message body.
        text: String,
        /// Option labels, in display order.
        options: Vec<String>,
    },
}

impl Message {
    /// Creates a plain text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a message offering quick-reply options.
    #[must_use]
    pub fn buttons(text: impl Into<String>, options: Vec<String>) -> Self {
        Self::Buttons {
            text: text.into(),
            options,
        }
    }

    /// Returns the message body.
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Text { text } | Self::Buttons { text, .. } => text,
        }
    }
}

/// A message as recorded in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Who sent it.
    pub from: Sender,
    /// What was sent.
    pub message: Message,
}

impl MessageRecord {
    /// Records a message sent by the user.
    #[must_use]
    pub fn from_user(message: Message) -> Self {
        Self {
            from: Sender::User,
            message,
        }
    }

    /// Records a message sent by the bot.
    #[must_use]
    pub fn from_bot(message: Message) -> Self {
        Self {
            from: Sender::Bot,
            message,
        }
    }
}
