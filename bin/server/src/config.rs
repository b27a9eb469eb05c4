//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`ENGINE__STEP_TIMEOUT_MS=3000`,
//! `MESSENGER__CALLBACK_URL=...`).

use botdock_conversation::EngineConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Conversation engine tunables.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Where replies are delivered.
    #[serde(default)]
    pub messenger: MessengerConfig,

    /// Built-in skill settings.
    #[serde(default)]
    pub skills: SkillsConfig,
}

/// Outgoing message delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct MessengerConfig {
    /// Replies are POSTed here as JSON. When unset they are only logged.
    #[serde(default)]
    pub callback_url: Option<String>,

    /// Timeout for outbound HTTP calls, in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

/// Settings for the built-in skills.
#[derive(Debug, Clone, Deserialize)]
pub struct SkillsConfig {
    /// Phrases that start the address skill. Comma-separated in the
    /// environment.
    #[serde(default = "default_address_phrases")]
    pub address_phrases: Vec<String>,

    /// Postal code lookup endpoint.
    #[serde(default = "default_zipcloud_url")]
    pub zipcloud_url: String,

    /// What the default skill answers.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            address_phrases: default_address_phrases(),
            zipcloud_url: default_zipcloud_url(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_http_timeout_ms() -> u64 {
    3000
}

fn default_address_phrases() -> Vec<String> {
    vec!["住所を登録したい".to_string(), "address".to_string()]
}

fn default_zipcloud_url() -> String {
    "https://zipcloud.ibsnet.co.jp/api/search".to_string()
}

fn default_fallback_reply() -> String {
    "すみません、よくわかりませんでした。".to_string()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default())
    }

    fn from_source(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                environment
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("skills.address_phrases")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
