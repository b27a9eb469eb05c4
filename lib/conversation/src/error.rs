//! Error types for the conversation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `SessionStoreError`: persistence failures (fatal to the step)
//! - `NluError`: the intent classifier failed
//! - `DeliveryError`: the messenger could not deliver a reply
//! - `EngineError`: step-level context wrapped around the above

use botdock_core::UserId;
use std::fmt;

/// Errors from session store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    /// The backing store could not be reached.
    Unavailable { reason: String },
    /// Another writer stored a newer version since the session was loaded.
    Conflict {
        user_id: UserId,
        expected: u64,
        found: u64,
    },
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "session store unavailable: {reason}"),
            Self::Conflict {
                user_id,
                expected,
                found,
            } => write!(
                f,
                "session for {user_id} changed concurrently: expected version {expected}, found {found}"
            ),
        }
    }
}

impl std::error::Error for SessionStoreError {}

/// Errors from the NLU collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NluError {
    /// The classifier could not be reached or answered with an error.
    Unavailable { reason: String },
}

impl fmt::Display for NluError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "nlu unavailable: {reason}"),
        }
    }
}

impl std::error::Error for NluError {}

/// Errors from the messenger collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The platform could not be reached.
    Unreachable { reason: String },
    /// The platform refused the messages.
    Rejected { status: u16, reason: String },
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { reason } => write!(f, "messenger unreachable: {reason}"),
            Self::Rejected { status, reason } => {
                write!(f, "messenger rejected delivery ({status}): {reason}")
            }
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Step-level engine errors.
///
/// Use these to add context when wrapping lower-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Loading or persisting the session failed; nothing was committed.
    SessionStore { user_id: UserId },
    /// The step did not finish in time; nothing was committed.
    Timeout { user_id: UserId, after_ms: u64 },
    /// The configured default skill is not registered.
    DefaultSkillMissing { name: String },
    /// The operation needs an active skill and the user has none.
    NoActiveSkill { user_id: UserId },
    /// A dynamic collection request was invalid for the active skill.
    InvalidCollection { user_id: UserId, skill: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStore { user_id } => {
                write!(f, "session store operation failed for {user_id}")
            }
            Self::Timeout { user_id, after_ms } => {
                write!(f, "step for {user_id} timed out after {after_ms}ms")
            }
            Self::DefaultSkillMissing { name } => {
                write!(f, "default skill '{name}' is not registered")
            }
            Self::NoActiveSkill { user_id } => write!(f, "{user_id} has no active skill"),
            Self::InvalidCollection { user_id, skill } => {
                write!(f, "invalid collection request for {user_id} in skill '{skill}'")
            }
        }
    }
}

impl std::error::Error for EngineError {}
