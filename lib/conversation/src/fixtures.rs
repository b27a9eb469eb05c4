//! Skills and collaborators shared by the conversation tests.

use crate::engine::{DeliveryReceipt, Messenger};
use crate::error::{DeliveryError, SessionStoreError};
use crate::event::Event;
use crate::router::KeywordNlu;
use crate::session::{Session, SessionStore};
use async_trait::async_trait;
use botdock_core::{Message, UserId};
use botdock_skill::{
    CollectRequests, FulfillmentError, ParameterSpec, ParseError, ResolutionError, Resolver,
    SkillDefinition, SkillHooks, SkillRegistry, display_value, parsers,
};
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ZIP_CODE_QUESTION: &str = "郵便番号を教えてください。";
pub const ZIP_CODE_INVALID: &str = "郵便番号は7桁の数字で教えてください。";
pub const STREET_QUESTION: &str = "番地を教えてください。";
pub const ADDRESS_DONE: &str = "ご住所を登録しました。";
pub const NAME_REASK: &str = "失礼しました。もう一度お名前を教えていただけますか？";
pub const JUMINHYO_ZIP_CODE_QUESTION: &str = "次にご住所ですが、郵便番号を教えていただけますか？";
pub const JUMINHYO_ZIP_CODE_REASK: &str = "なんと。お手数ですが郵便番号を再度教えてもらえますか？";
pub const FALLBACK_REPLY: &str = "すみません、よくわかりませんでした。";

pub fn city_prompt(value: &JsonValue) -> String {
    format!("{}で間違いないですか？", display_value(value))
}

fn parse_zip_code(input: &str) -> Result<JsonValue, ParseError> {
    let raw = input.trim();
    let digits: String = raw.chars().filter(|c| *c != '-').collect();
    if digits.len() == 7 && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(json!(raw))
    } else {
        Err(ParseError::new("expected seven digits"))
    }
}

/// Resolves postal codes from a fixed table.
pub struct TableResolver;

#[async_trait]
impl Resolver for TableResolver {
    async fn reason(&self, value: JsonValue) -> Result<JsonValue, ResolutionError> {
        let raw = display_value(&value);
        let digits: String = raw.chars().filter(|c| *c != '-').collect();
        let address = match digits.as_str() {
            "1070061" => "東京都港区北青山",
            "1070062" => "東京都港区南青山",
            _ => return Err(ResolutionError::NoMatch { value: raw }),
        };
        Ok(json!({"zip_code": raw, "resolved_address": address}))
    }
}

/// Fails a given number of times with a transient error, then succeeds.
#[derive(Clone)]
pub struct FlakyResolver {
    failures: usize,
    calls: Arc<AtomicUsize>,
}

impl FlakyResolver {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for FlakyResolver {
    async fn reason(&self, value: JsonValue) -> Result<JsonValue, ResolutionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ResolutionError::Unavailable {
                reason: "lookup timed out".to_string(),
            });
        }
        TableResolver.reason(value).await
    }
}

/// Never answers within any reasonable step timeout.
pub struct SlowResolver;

#[async_trait]
impl Resolver for SlowResolver {
    async fn reason(&self, value: JsonValue) -> Result<JsonValue, ResolutionError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(value)
    }
}

fn zip_code(message: &str, resolver: Arc<dyn Resolver>) -> ParameterSpec {
    ParameterSpec::new("zip_code", message)
        .parse_with(parse_zip_code)
        .with_invalid_message(ZIP_CODE_INVALID)
        .resolver(resolver)
}

fn city() -> ParameterSpec {
    ParameterSpec::new("city", "市区町村を教えてください。")
        .needs_confirmation()
        .depends_on("zip_code")
        .propose_with(|confirmed: &BTreeMap<String, JsonValue>| {
            confirmed
                .get("zip_code")
                .and_then(|zip| zip.get("resolved_address"))
                .cloned()
        })
        .confirm_with(city_prompt)
}

fn street() -> ParameterSpec {
    ParameterSpec::new("street", STREET_QUESTION)
}

struct Finish(&'static str);

#[async_trait]
impl SkillHooks for Finish {
    async fn finish(
        &self,
        _confirmed: &BTreeMap<String, JsonValue>,
    ) -> Result<Vec<Message>, FulfillmentError> {
        Ok(vec![Message::text(self.0)])
    }
}

struct Juminhyo;

#[async_trait]
impl SkillHooks for Juminhyo {
    fn on_committed(
        &self,
        parameter: &str,
        _value: &JsonValue,
        _confirmed: &BTreeMap<String, JsonValue>,
        requests: &mut CollectRequests,
    ) {
        if parameter == "name" {
            requests.collect_by_param(["zip_code", "city", "street"]);
        }
    }

    async fn finish(
        &self,
        _confirmed: &BTreeMap<String, JsonValue>,
    ) -> Result<Vec<Message>, FulfillmentError> {
        Err(FulfillmentError {
            skill: "juminhyo".to_string(),
            reason: "application backend is offline".to_string(),
        })
    }
}

pub fn address_skill() -> SkillDefinition {
    SkillDefinition::builder("address")
        .required(zip_code(ZIP_CODE_QUESTION, Arc::new(TableResolver)))
        .required(city())
        .required(street())
        .hooks(Arc::new(Finish(ADDRESS_DONE)))
        .build()
        .expect("valid address skill")
}

/// Resident certificate application: asks for the address only once the
/// applicant's name is confirmed.
pub fn juminhyo_skill() -> SkillDefinition {
    SkillDefinition::builder("juminhyo")
        .required(
            ParameterSpec::new(
                "juminhyo_type",
                "住民票が必要なのはご本人だけですか？世帯全員分ですか？",
            )
            .parser(parsers::OneOf::new(["本人だけ", "世帯全員"])),
        )
        .required(
            ParameterSpec::new("name", "お名前を教えてください。")
                .needs_confirmation()
                .parse_with(|input: &str| {
                    let name = input.trim().trim_end_matches("です").trim();
                    if name.is_empty() {
                        return Err(ParseError::new("name is blank"));
                    }
                    Ok(json!(name))
                })
                .with_reask_message(NAME_REASK)
                .confirm_with(|value: &JsonValue| {
                    format!("{}様で間違いないですか？", display_value(value))
                }),
        )
        .optional(
            ParameterSpec::new("name", "お名前をカタカナで教えてください。").with_key("name_kana"),
        )
        .optional(
            zip_code(JUMINHYO_ZIP_CODE_QUESTION, Arc::new(TableResolver))
                .with_reask_message(JUMINHYO_ZIP_CODE_REASK),
        )
        .optional(city())
        .optional(street())
        .hooks(Arc::new(Juminhyo))
        .build()
        .expect("valid juminhyo skill")
}

pub fn fallback_skill() -> SkillDefinition {
    SkillDefinition::builder("fallback")
        .hooks(Arc::new(Finish(FALLBACK_REPLY)))
        .build()
        .expect("valid fallback skill")
}

pub fn flaky_skill(resolver: FlakyResolver) -> SkillDefinition {
    SkillDefinition::builder("flaky")
        .required(zip_code(ZIP_CODE_QUESTION, Arc::new(resolver)))
        .build()
        .expect("valid flaky skill")
}

pub fn slow_skill() -> SkillDefinition {
    SkillDefinition::builder("slow")
        .required(zip_code(ZIP_CODE_QUESTION, Arc::new(SlowResolver)))
        .build()
        .expect("valid slow skill")
}

pub fn registry() -> SkillRegistry {
    SkillRegistry::new()
        .with(address_skill())
        .with(juminhyo_skill())
        .with(fallback_skill())
}

pub fn nlu() -> KeywordNlu {
    KeywordNlu::new()
        .with("コレクトテスト", "address")
        .with("住民票を申請したい", "juminhyo")
        .with("遅いテスト", "slow")
}

/// Records every delivery; optionally refuses all of them.
#[derive(Default)]
pub struct RecordingMessenger {
    fail: bool,
    delay: Option<Duration>,
    sent: Mutex<Vec<(UserId, Vec<Message>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(UserId, Vec<Message>)> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn reply(
        &self,
        event: &Event,
        messages: &[Message],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(DeliveryError::Rejected {
                status: 400,
                reason: "invalid reply token".to_string(),
            });
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((event.user_id.clone(), messages.to_vec()));
        Ok(DeliveryReceipt {
            delivered: messages.len(),
        })
    }
}

/// A store whose backend is down.
pub struct UnavailableStore;

#[async_trait]
impl SessionStore for UnavailableStore {
    async fn get(&self, _user_id: &UserId) -> Result<Option<Session>, SessionStoreError> {
        Err(SessionStoreError::Unavailable {
            reason: "connection reset".to_string(),
        })
    }

    async fn set(&self, _session: Session) -> Result<Session, SessionStoreError> {
        Err(SessionStoreError::Unavailable {
            reason: "connection reset".to_string(),
        })
    }

    async fn clear(&self, _user_id: &UserId) -> Result<(), SessionStoreError> {
        Err(SessionStoreError::Unavailable {
            reason: "connection reset".to_string(),
        })
    }
}
