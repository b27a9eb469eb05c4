//! Conversation engine for botdock.
//!
//! This crate provides:
//!
//! - **Session Store**: per-user conversation state with serialized
//!   read-modify-write
//! - **Intent Router**: sticky skill selection with NLU fallback
//! - **Parameter Collector**: asks, parses, enriches and commits parameters
//! - **Confirmation Manager**: yes/no handling with cascading rejection
//! - **Response Builder**: pure projection of a session
//! - **Engine**: one serialized step per inbound event

pub mod collector;
pub mod config;
pub mod confirmation;
pub mod engine;
pub mod error;
pub mod event;
pub mod response;
pub mod router;
pub mod session;

#[cfg(test)]
mod fixtures;

pub use collector::{Collector, Progress};
pub use config::EngineConfig;
pub use confirmation::{ConfirmationManager, Reply};
pub use engine::{ConversationEngine, Delivery, DeliveryReceipt, Messenger, StepOutcome};
pub use error::{DeliveryError, EngineError, NluError, SessionStoreError};
pub use event::{Event, EventKind};
pub use response::{Previous, Response};
pub use router::{Intent, IntentRouter, KeywordNlu, Nlu, NluContext, Route};
pub use session::{MemorySessionStore, ParameterSlot, Session, SessionStore, Stage};
