//! Skill model for botdock.
//!
//! This crate provides:
//!
//! - **Parameter specs**: how a single value is asked for, parsed, enriched
//!   and confirmed
//! - **Skill definitions**: the ordered parameters a skill needs, its reply
//!   vocabulary and its hooks
//! - **Rejection graph**: which parameters are invalidated together when a
//!   confirmation is rejected
//! - **Skill registry**: immutable lookup of definitions by name

pub mod definition;
pub mod error;
pub mod parameter;
pub mod registry;
pub mod rejection;

pub use definition::{
    CollectRequest, CollectRequests, NoHooks, Placement, SkillDefinition,
    SkillDefinitionBuilder, SkillHooks, Vocabulary,
};
pub use error::{FulfillmentError, ParseError, ResolutionError, SkillError, SkillNotFound};
pub use parameter::{ParameterSpec, Parser, Proposer, Resolver, display_value, parsers};
pub use registry::SkillRegistry;
pub use rejection::RejectionGraph;
