//! Engine configuration.
//!
//! Deserialized as part of the server configuration; every field has a
//! default so an empty environment yields a working engine.

use serde::Deserialize;
use std::time::Duration;

/// Tunables for the conversation engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Skill used when routing finds no (known) intent.
    #[serde(default = "default_default_skill")]
    pub default_skill: String,

    /// Upper bound for one event-processing step, in milliseconds.
    /// Covers load, routing, resolution and persistence; not delivery.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Number of history entries kept in `previous.message`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Attempts per step for a resolver reporting a transient failure.
    #[serde(default = "default_resolution_attempts")]
    pub resolution_attempts: u32,

    /// Upper bound for one resolver attempt, in milliseconds. An attempt
    /// that runs out counts as a transient failure.
    #[serde(default = "default_resolution_timeout_ms")]
    pub resolution_timeout_ms: u64,

    /// Failed resolution steps for one parameter before the fallback
    /// message is sent instead of the re-prompt.
    #[serde(default = "default_max_resolution_failures")]
    pub max_resolution_failures: u32,

    /// Annotation sent ahead of the re-prompt when input does not parse.
    #[serde(default = "default_parse_error_message")]
    pub parse_error_message: String,

    /// Annotation sent ahead of the re-prompt when a resolver is down.
    #[serde(default = "default_resolution_error_message")]
    pub resolution_error_message: String,

    /// Sent when the engine gives up on the current exchange.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

fn default_default_skill() -> String {
    "fallback".to_string()
}

fn default_step_timeout_ms() -> u64 {
    5000
}

fn default_history_limit() -> usize {
    10
}

fn default_resolution_attempts() -> u32 {
    2
}

fn default_resolution_timeout_ms() -> u64 {
    2000
}

fn default_max_resolution_failures() -> u32 {
    3
}

fn default_parse_error_message() -> String {
    "すみません、うまく読み取れませんでした。".to_string()
}

fn default_resolution_error_message() -> String {
    "ただいま確認できませんでした。もう一度お試しください。".to_string()
}

fn default_fallback_message() -> String {
    "申し訳ありません、エラーが発生しました。しばらくしてからもう一度お試しください。".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_skill: default_default_skill(),
            step_timeout_ms: default_step_timeout_ms(),
            history_limit: default_history_limit(),
            resolution_attempts: default_resolution_attempts(),
            resolution_timeout_ms: default_resolution_timeout_ms(),
            max_resolution_failures: default_max_resolution_failures(),
            parse_error_message: default_parse_error_message(),
            resolution_error_message: default_resolution_error_message(),
            fallback_message: default_fallback_message(),
        }
    }
}

impl EngineConfig {
    /// The step timeout as a [`Duration`].
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// The per-attempt resolver timeout as a [`Duration`].
    #[must_use]
    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_millis(self.resolution_timeout_ms)
    }
}
