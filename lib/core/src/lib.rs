//! Core domain types and utilities for botdock.
//!
//! This crate provides the foundational types shared by the skill model,
//! the conversation engine, and the webhook server: error handling,
//! identifiers, and platform-agnostic message descriptors.

pub mod error;
pub mod id;
pub mod message;

pub use error::Result;
pub use id::{ConversationId, ParseIdError, StepId, UserId};
pub use message::{Message, MessageRecord, Sender};
