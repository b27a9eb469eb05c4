//! Confirmation sub-state machine.
//!
//! ```text
//! AwaitingValue ──parse ok──▶ AwaitingConfirmation ──yes──▶ committed
//!       ▲                            │
//!       └────────────no (cascade)────┘
//! ```
//!
//! Ambiguous replies leave the state alone and repeat the prompt verbatim.

use crate::session::{Session, Stage};
use botdock_core::Message;
use botdock_skill::{ParameterSpec, SkillDefinition, display_value};
use serde_json::Value as JsonValue;
use tracing::debug;

/// How a reply to a confirmation prompt was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// The user accepted the value.
    Affirmative,
    /// The user rejected the value.
    Negative,
    /// Neither; the prompt is repeated.
    Ambiguous,
}

/// Handles yes/no replies for one skill.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationManager<'a> {
    skill: &'a SkillDefinition,
}

impl<'a> ConfirmationManager<'a> {
    #[must_use]
    pub fn new(skill: &'a SkillDefinition) -> Self {
        Self { skill }
    }

    /// Classifies a reply to the prompt for `pending`.
    ///
    /// The skill vocabulary decides first. A reply repeating the pending
    /// value itself (a postback from a proposal button) also counts as yes.
    #[must_use]
    pub fn classify(&self, pending: &JsonValue, input: &str) -> Reply {
        match self.skill.vocabulary().classify(input) {
            Some(true) => Reply::Affirmative,
            Some(false) => Reply::Negative,
            None => {
                let input = input.trim();
                if !input.is_empty() && display_value(pending).trim() == input {
                    Reply::Affirmative
                } else {
                    Reply::Ambiguous
                }
            }
        }
    }

    /// Builds the confirmation prompt for a value.
    #[must_use]
    pub fn prompt(&self, spec: &ParameterSpec, value: &JsonValue) -> Message {
        let vocabulary = self.skill.vocabulary();
        Message::buttons(
            spec.confirm_message(value),
            vec![
                vocabulary.yes_label().to_string(),
                vocabulary.no_label().to_string(),
            ],
        )
    }

    /// Applies a rejection of `name`: clears its cascade from `confirmed`
    /// and puts the earliest cleared parameter back at the head.
    pub fn reject(&self, session: &mut Session, name: &str) {
        let cleared = self.skill.rejection().cascade(name);
        for parameter in &cleared {
            session.confirmed.remove(parameter);
            session.reset_counters(parameter);
        }
        session.stage = Stage::AwaitingValue;
        session.refresh_to_confirm();
        session.confirming = session.to_confirm.first().cloned();

        debug!(
            parameter = name,
            cleared = ?cleared,
            next = session.confirming.as_deref().unwrap_or_default(),
            "confirmation rejected"
        );
    }
}
