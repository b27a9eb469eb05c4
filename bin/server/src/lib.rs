//! botdock webhook server.
//!
//! This crate wires the conversation engine to HTTP: a webhook for
//! normalized platform events, session inspection endpoints, the built-in
//! skills and the messengers that carry replies back out.

pub mod config;
pub mod error;
pub mod messenger;
pub mod routes;
pub mod skills;

pub use routes::{AppState, router};
