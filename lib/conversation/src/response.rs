//! Response builder.
//!
//! The response is the externally visible projection of a session. Building
//! it is pure, so replaying a step at the transport boundary always yields
//! the same bytes.

use crate::session::Session;
use botdock_core::MessageRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Conversation history, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Previous {
    pub message: Vec<MessageRecord>,
}

/// Projection of a session sent back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Parameter being asked or confirmed.
    pub confirming: Option<String>,
    /// Committed parameter values.
    pub confirmed: BTreeMap<String, JsonValue>,
    /// Parameters not yet committed, in collection order.
    pub to_confirm: Vec<String>,
    /// Recent history.
    pub previous: Previous,
}

impl Response {
    /// Projects a session.
    #[must_use]
    pub fn build(session: &Session) -> Self {
        Self {
            confirming: session.confirming.clone(),
            confirmed: session.confirmed.clone(),
            to_confirm: session.to_confirm.clone(),
            previous: Previous {
                message: session.previous.clone(),
            },
        }
    }
}

impl From<&Session> for Response {
    fn from(session: &Session) -> Self {
        Self::build(session)
    }
}
