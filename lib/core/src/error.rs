//! Error handling foundation for botdock.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! types; the conversation engine maps collaborator failures into
//! step-level `EngineError` reports before they reach a transport.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
