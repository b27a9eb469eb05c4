//! Built-in skills.
//!
//! - `address`: postal code (resolved through zipcloud), city proposed from
//!   the resolved address and confirmed, then street.
//! - `fallback`: the default skill; collects nothing and answers with a
//!   configured reply.

use crate::config::SkillsConfig;
use async_trait::async_trait;
use botdock_conversation::KeywordNlu;
use botdock_core::Message;
use botdock_skill::{
    FulfillmentError, ParameterSpec, ParseError, ResolutionError, Resolver, SkillDefinition,
    SkillError, SkillHooks, SkillRegistry, display_value,
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Parses a Japanese postal code, with or without the hyphen.
///
/// The value keeps the text as entered.
pub fn parse_zip_code(input: &str) -> Result<JsonValue, ParseError> {
    let raw = input.trim();
    let digits = zip_digits(raw);
    if digits.len() == 7 && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(json!(raw))
    } else {
        Err(ParseError::new("expected a seven digit postal code"))
    }
}

fn zip_digits(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, '-' | 'ー' | '－')).collect()
}

#[derive(Debug, Deserialize)]
struct ZipcloudResponse {
    status: u16,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    results: Option<Vec<ZipcloudAddress>>,
}

#[derive(Debug, Deserialize)]
struct ZipcloudAddress {
    address1: String,
    address2: String,
    address3: String,
}

/// Resolves postal codes to addresses through the zipcloud API.
#[derive(Debug, Clone)]
pub struct ZipcloudResolver {
    client: reqwest::Client,
    url: String,
}

impl ZipcloudResolver {
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Resolver for ZipcloudResolver {
    #[instrument(skip(self))]
    async fn reason(&self, value: JsonValue) -> Result<JsonValue, ResolutionError> {
        let raw = display_value(&value);
        let digits = zip_digits(&raw);

        let unavailable = |e: reqwest::Error| ResolutionError::Unavailable {
            reason: e.to_string(),
        };
        let body: ZipcloudResponse = self
            .client
            .get(&self.url)
            .query(&[("zipcode", digits.as_str())])
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        if body.status != 200 {
            debug!(status = body.status, message = ?body.message, "zipcloud refused lookup");
            return Err(ResolutionError::NoMatch { value: raw });
        }
        let Some(address) = body.results.and_then(|r| r.into_iter().next()) else {
            return Err(ResolutionError::NoMatch { value: raw });
        };

        Ok(json!({
            "zip_code": raw,
            "resolved_address": format!("{}{}{}", address.address1, address.address2, address.address3),
        }))
    }
}

struct AddressHooks;

#[async_trait]
impl SkillHooks for AddressHooks {
    async fn finish(
        &self,
        confirmed: &BTreeMap<String, JsonValue>,
    ) -> Result<Vec<Message>, FulfillmentError> {
        let part = |name: &str| {
            confirmed
                .get(name)
                .map(display_value)
                .ok_or_else(|| FulfillmentError {
                    skill: "address".to_string(),
                    reason: format!("missing {name}"),
                })
        };
        Ok(vec![Message::text(format!(
            "ご住所を承りました: {}{}",
            part("city")?,
            part("street")?
        ))])
    }
}

/// The address skill.
pub fn address_skill(resolver: Arc<dyn Resolver>) -> Result<SkillDefinition, SkillError> {
    SkillDefinition::builder("address")
        .required(
            ParameterSpec::new("zip_code", "郵便番号を教えてください。")
                .parse_with(parse_zip_code)
                .with_invalid_message("郵便番号は7桁の数字で教えてください。")
                .resolver(resolver),
        )
        .required(
            ParameterSpec::new("city", "都道府県と市区町村を教えてください。")
                .needs_confirmation()
                .depends_on("zip_code")
                .propose_with(|confirmed: &BTreeMap<String, JsonValue>| {
                    confirmed
                        .get("zip_code")
                        .and_then(|zip| zip.get("resolved_address"))
                        .cloned()
                })
                .confirm_with(|value: &JsonValue| {
                    format!("{}で間違いないですか？", display_value(value))
                }),
        )
        .required(ParameterSpec::new("street", "番地を教えてください。"))
        .hooks(Arc::new(AddressHooks))
        .build()
}

struct ReplyWith(String);

#[async_trait]
impl SkillHooks for ReplyWith {
    async fn finish(
        &self,
        _confirmed: &BTreeMap<String, JsonValue>,
    ) -> Result<Vec<Message>, FulfillmentError> {
        Ok(vec![Message::text(self.0.clone())])
    }
}

/// The default skill.
pub fn fallback_skill(reply: impl Into<String>) -> Result<SkillDefinition, SkillError> {
    SkillDefinition::builder("fallback")
        .hooks(Arc::new(ReplyWith(reply.into())))
        .build()
}

/// Builds the registry of built-in skills.
///
/// # Errors
///
/// Returns [`SkillError`] if a definition is invalid.
pub fn registry(config: &SkillsConfig, client: reqwest::Client) -> Result<SkillRegistry, SkillError> {
    let resolver = Arc::new(ZipcloudResolver::new(client, config.zipcloud_url.clone()));
    Ok(SkillRegistry::new()
        .with(address_skill(resolver)?)
        .with(fallback_skill(config.fallback_reply.clone())?))
}

/// Keyword classifier for the built-in skills.
#[must_use]
pub fn nlu(config: &SkillsConfig) -> KeywordNlu {
    config
        .address_phrases
        .iter()
        .map(|phrase| (phrase.clone(), "address"))
        .collect()
}
