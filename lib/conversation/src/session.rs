//! Conversation sessions and their storage.
//!
//! A session holds one user's dialogue state. The engine loads it, mutates a
//! working copy for exactly one event, and stores it back; the store's
//! version check turns concurrent writers into a conflict instead of a lost
//! update.

use crate::error::SessionStoreError;
use async_trait::async_trait;
use botdock_core::{ConversationId, MessageRecord, UserId};
use botdock_skill::SkillDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

/// One entry of the effective parameter list: a parameter name and the
/// catalog key of the spec collecting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSlot {
    /// Parameter name.
    pub name: String,
    /// Catalog key of the spec in the skill definition.
    pub key: String,
}

/// Sub-state of the parameter currently being confirmed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for the user to enter a value.
    #[default]
    AwaitingValue,
    /// Waiting for a yes/no on a parsed (and possibly enriched) value.
    AwaitingConfirmation {
        /// The value that will be committed on "yes".
        value: JsonValue,
    },
}

/// Per-user conversation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Conversation identifier, minted on creation.
    pub id: ConversationId,
    /// Owner.
    pub user_id: UserId,
    /// Active (or last) skill.
    pub skill_name: Option<String>,
    /// Effective parameter list, in collection order.
    pub parameters: Vec<ParameterSlot>,
    /// Committed values.
    pub confirmed: BTreeMap<String, JsonValue>,
    /// Names not yet committed, in collection order.
    pub to_confirm: Vec<String>,
    /// Parameter currently asked or confirmed.
    pub confirming: Option<String>,
    /// Sub-state of `confirming`.
    pub stage: Stage,
    /// Unparseable answers per parameter since its last commit.
    pub retries: BTreeMap<String, u32>,
    /// Steps per parameter whose resolver failed since its last commit.
    #[serde(default)]
    pub resolution_failures: BTreeMap<String, u32>,
    /// History, most recent first.
    pub previous: Vec<MessageRecord>,
    /// Store version this copy was loaded at.
    pub version: u64,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last stepped.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates an empty session for a user.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            user_id,
            skill_name: None,
            parameters: Vec::new(),
            confirmed: BTreeMap::new(),
            to_confirm: Vec::new(),
            confirming: None,
            stage: Stage::AwaitingValue,
            retries: BTreeMap::new(),
            resolution_failures: BTreeMap::new(),
            previous: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true while the active skill still has parameters to collect.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.skill_name.is_some() && (!self.to_confirm.is_empty() || self.confirming.is_some())
    }

    /// Starts `skill` from scratch, dropping any previous collection state.
    ///
    /// History, identity and version are kept.
    pub fn start_skill(&mut self, skill: &SkillDefinition) {
        self.skill_name = Some(skill.name().to_string());
        self.parameters = skill
            .required_parameters()
            .map(|spec| ParameterSlot {
                name: spec.name().to_string(),
                key: spec.key().to_string(),
            })
            .collect();
        self.confirmed.clear();
        self.confirming = None;
        self.stage = Stage::AwaitingValue;
        self.retries.clear();
        self.resolution_failures.clear();
        self.refresh_to_confirm();
    }

    /// Drops the active skill and all collection state.
    pub fn abandon_skill(&mut self) {
        self.skill_name = None;
        self.parameters.clear();
        self.confirmed.clear();
        self.to_confirm.clear();
        self.confirming = None;
        self.stage = Stage::AwaitingValue;
        self.retries.clear();
        self.resolution_failures.clear();
    }

    /// Recomputes `to_confirm` from the effective parameter list.
    pub fn refresh_to_confirm(&mut self) {
        self.to_confirm = self
            .parameters
            .iter()
            .filter(|slot| !self.confirmed.contains_key(&slot.name))
            .map(|slot| slot.name.clone())
            .collect();
    }

    /// Looks up a slot by parameter name.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&ParameterSlot> {
        self.parameters.iter().find(|slot| slot.name == name)
    }

    /// Increments and returns the parse retry counter for a parameter.
    pub fn bump_retry(&mut self, name: &str) -> u32 {
        bump(&mut self.retries, name)
    }

    /// Increments and returns the resolution failure counter for a parameter.
    pub fn bump_resolution_failure(&mut self, name: &str) -> u32 {
        bump(&mut self.resolution_failures, name)
    }

    /// Forgets both failure counters of a parameter.
    pub fn reset_counters(&mut self, name: &str) {
        self.retries.remove(name);
        self.resolution_failures.remove(name);
    }

    /// Prepends records to the history, keeping at most `limit` entries.
    ///
    /// Records are given in the order they happened.
    pub fn record(&mut self, records: impl IntoIterator<Item = MessageRecord>, limit: usize) {
        for record in records {
            self.previous.insert(0, record);
        }
        self.previous.truncate(limit);
    }

    /// Marks the session as stepped now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Checks the partition invariant: `to_confirm`, `confirming` and the
    /// keys of `confirmed` together cover exactly the effective parameters,
    /// with nothing pending also committed, and `confirming` at the head of
    /// `to_confirm`.
    #[must_use]
    pub fn partition_holds(&self) -> bool {
        let declared: BTreeSet<&str> = self.parameters.iter().map(|s| s.name.as_str()).collect();
        if declared.len() != self.parameters.len() {
            return false;
        }

        let mut covered: BTreeSet<&str> = self.confirmed.keys().map(String::as_str).collect();
        let mut pending = BTreeSet::new();
        for name in self.to_confirm.iter().chain(self.confirming.iter()) {
            if self.confirmed.contains_key(name) {
                return false;
            }
            pending.insert(name.as_str());
        }
        if pending.len() < self.to_confirm.len() {
            return false;
        }
        covered.extend(pending);

        let head_ok = match &self.confirming {
            Some(name) => self.to_confirm.first() == Some(name),
            None => true,
        };
        let values_ok = self.confirmed.values().all(|v| !v.is_null());

        covered == declared && head_ok && values_ok
    }
}

fn bump(counters: &mut BTreeMap<String, u32>, name: &str) -> u32 {
    let counter = counters.entry(name.to_string()).or_insert(0);
    *counter += 1;
    *counter
}

/// Trait for session storage.
///
/// Implementations must make `set` a compare-and-set on
/// [`Session::version`]: it succeeds only if the stored version (zero when
/// absent) still equals the version the session was loaded at, and stores
/// the session with the version incremented.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the session of a user, if any.
    async fn get(&self, user_id: &UserId) -> Result<Option<Session>, SessionStoreError>;

    /// Stores a session and returns the stored copy.
    async fn set(&self, session: Session) -> Result<Session, SessionStoreError>;

    /// Deletes the session of a user.
    async fn clear(&self, user_id: &UserId) -> Result<(), SessionStoreError>;
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<UserId, Session>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sessions.
    pub fn len(&self) -> Result<usize, SessionStoreError> {
        let sessions = self.sessions.read().map_err(|e| poisoned(&e))?;
        Ok(sessions.len())
    }

    /// Returns whether the store is empty.
    pub fn is_empty(&self) -> Result<bool, SessionStoreError> {
        Ok(self.len()? == 0)
    }
}

fn poisoned(err: &impl std::fmt::Display) -> SessionStoreError {
    SessionStoreError::Unavailable {
        reason: format!("lock poisoned: {err}"),
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<Session>, SessionStoreError> {
        let sessions = self.sessions.read().map_err(|e| poisoned(&e))?;
        Ok(sessions.get(user_id).cloned())
    }

    async fn set(&self, mut session: Session) -> Result<Session, SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| poisoned(&e))?;
        let found = sessions.get(&session.user_id).map_or(0, |s| s.version);
        if found != session.version {
            return Err(SessionStoreError::Conflict {
                user_id: session.user_id.clone(),
                expected: session.version,
                found,
            });
        }
        session.version += 1;
        sessions.insert(session.user_id.clone(), session.clone());
        Ok(session)
    }

    async fn clear(&self, user_id: &UserId) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| poisoned(&e))?;
        sessions.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botdock_core::Message;
    use botdock_skill::ParameterSpec;
    use serde_json::json;

    fn address() -> SkillDefinition {
        SkillDefinition::builder("address")
            .required(ParameterSpec::new("zip_code", "郵便番号は？"))
            .required(ParameterSpec::new("city", "市区町村は？").depends_on("zip_code"))
            .required(ParameterSpec::new("street", "番地は？"))
            .build()
            .expect("valid definition")
    }

    #[test]
    fn new_session_is_idle() {
        let session = Session::new(UserId::new("collect"));
        assert!(!session.is_in_progress());
        assert!(session.partition_holds());
        assert_eq!(session.version, 0);
    }

    #[test]
    fn start_skill_queues_required_in_order() {
        let mut session = Session::new(UserId::new("collect"));
        session.confirmed.insert("stale".to_string(), json!("x"));
        session.start_skill(&address());

        assert_eq!(session.skill_name.as_deref(), Some("address"));
        assert_eq!(session.to_confirm, vec!["zip_code", "city", "street"]);
        assert!(session.confirmed.is_empty());
        assert!(session.is_in_progress());
        assert!(session.partition_holds());
    }

    #[test]
    fn refresh_skips_confirmed() {
        let mut session = Session::new(UserId::new("collect"));
        session.start_skill(&address());
        session.confirmed.insert("city".to_string(), json!("東京都港区北青山"));
        session.refresh_to_confirm();
        assert_eq!(session.to_confirm, vec!["zip_code", "street"]);
    }

    #[test]
    fn partition_detects_overlap_and_stale_head() {
        let mut session = Session::new(UserId::new("collect"));
        session.start_skill(&address());

        session.confirming = Some("city".to_string());
        assert!(!session.partition_holds(), "confirming must be the head");

        session.confirming = Some("zip_code".to_string());
        assert!(session.partition_holds());

        session.confirmed.insert("zip_code".to_string(), json!("1070061"));
        assert!(!session.partition_holds(), "pending and confirmed overlap");
    }

    #[test]
    fn partition_rejects_null_values() {
        let mut session = Session::new(UserId::new("collect"));
        session.start_skill(&address());
        session.confirmed.insert("zip_code".to_string(), JsonValue::Null);
        session.refresh_to_confirm();
        assert!(!session.partition_holds());
    }

    #[test]
    fn failure_counters_are_kept_apart() {
        let mut session = Session::new(UserId::new("collect"));
        session.start_skill(&address());

        assert_eq!(session.bump_retry("zip_code"), 1);
        assert_eq!(session.bump_retry("zip_code"), 2);
        assert_eq!(session.bump_resolution_failure("zip_code"), 1);

        session.reset_counters("zip_code");
        assert!(session.retries.is_empty());
        assert!(session.resolution_failures.is_empty());
    }

    #[test]
    fn history_is_most_recent_first_and_capped() {
        let mut session = Session::new(UserId::new("collect"));
        session.record(
            [
                MessageRecord::from_user(Message::text("one")),
                MessageRecord::from_bot(Message::text("two")),
                MessageRecord::from_bot(Message::text("three")),
            ],
            2,
        );
        assert_eq!(session.previous.len(), 2);
        assert_eq!(session.previous[0].message.body(), "three");
        assert_eq!(session.previous[1].message.body(), "two");
    }

    #[test]
    fn session_serde_roundtrip() {
        let mut session = Session::new(UserId::new("collect"));
        session.start_skill(&address());
        session.confirming = Some("zip_code".to_string());
        session.stage = Stage::AwaitingConfirmation {
            value: json!({"zip_code": "1070061"}),
        };

        let json = serde_json::to_string(&session).expect("serialize");
        let parsed: Session = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.id, session.id);
        assert_eq!(parsed.stage, session.stage);
        assert_eq!(parsed.parameters, session.parameters);
    }

    #[tokio::test]
    async fn memory_store_compare_and_set() {
        let store = MemorySessionStore::new();
        let user = UserId::new("collect");
        assert!(store.get(&user).await.expect("get").is_none());

        let stored = store.set(Session::new(user.clone())).await.expect("first set");
        assert_eq!(stored.version, 1);

        let loaded = store.get(&user).await.expect("get").expect("present");
        let stale = loaded.clone();
        store.set(loaded).await.expect("second set");

        let err = store.set(stale).await.unwrap_err();
        assert_eq!(
            err,
            SessionStoreError::Conflict {
                user_id: user.clone(),
                expected: 1,
                found: 2,
            }
        );
        assert_eq!(store.len().expect("len"), 1);
    }

    #[tokio::test]
    async fn memory_store_clear() {
        let store = MemorySessionStore::new();
        let user = UserId::new("collect");
        store.set(Session::new(user.clone())).await.expect("set");
        store.clear(&user).await.expect("clear");
        assert!(store.get(&user).await.expect("get").is_none());
        assert!(store.is_empty().expect("is_empty"));
    }
}
