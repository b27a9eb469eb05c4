//! Parameter collection.
//!
//! The collector drives one skill for one step. It works on the session the
//! engine loaded, queues the messages the step sends, and leaves the session
//! satisfying the partition invariant whenever it returns.

use crate::config::EngineConfig;
use crate::confirmation::{ConfirmationManager, Reply};
use crate::session::{ParameterSlot, Session, Stage};
use botdock_core::Message;
use botdock_skill::{
    CollectRequests, ParameterSpec, Placement, ResolutionError, Resolver, SkillDefinition,
    SkillError, display_value,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Where the skill stands after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Waiting for a value for the named parameter.
    Asking(String),
    /// Waiting for a yes/no on the named parameter.
    Confirming(String),
    /// Every parameter is committed.
    Completed,
}

impl Progress {
    /// Returns true once collection is done.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Drives one skill through one step.
pub struct Collector<'a> {
    skill: &'a SkillDefinition,
    session: &'a mut Session,
    config: &'a EngineConfig,
    outbox: Vec<Message>,
}

impl<'a> Collector<'a> {
    /// Creates a collector over a loaded session.
    pub fn new(skill: &'a SkillDefinition, session: &'a mut Session, config: &'a EngineConfig) -> Self {
        Self {
            skill,
            session,
            config,
            outbox: Vec::new(),
        }
    }

    /// Starts the skill from scratch and asks the first question.
    ///
    /// Seed values are committed up front when they parse and the parameter
    /// needs neither confirmation nor resolution.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError`] when the skill definition or its hooks refer to
    /// unknown catalog keys.
    pub fn begin(&mut self, seeds: &BTreeMap<String, JsonValue>) -> Result<Progress, SkillError> {
        self.session.start_skill(self.skill);
        debug!(skill = self.skill.name(), "starting skill");

        for slot in self.session.parameters.clone() {
            let Some(seed) = seeds.get(&slot.name) else {
                continue;
            };
            let spec = self.skill.require_spec(&slot.key)?;
            if spec.requires_confirmation() || spec.resolver_ref().is_some() {
                continue;
            }
            if self.session.confirmed.contains_key(&slot.name) {
                continue;
            }
            match spec.parse(&display_value(seed)) {
                Ok(value) => self.commit(&slot.name, value)?,
                Err(e) => debug!(parameter = %slot.name, reason = %e, "ignoring seed value"),
            }
        }

        self.ask_next(false)
    }

    /// Consumes one input against the parameter being collected.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError`] when the session references a catalog key the
    /// skill does not know.
    pub async fn consume(&mut self, input: &str) -> Result<Progress, SkillError> {
        let skill = self.skill;
        let Some(name) = self.session.confirming.clone() else {
            return self.ask_next(false);
        };
        let Some(slot) = self.session.slot(&name).cloned() else {
            warn!(parameter = %name, "confirming parameter is not in the session");
            self.session.confirming = None;
            return self.ask_next(false);
        };
        let spec = skill.require_spec(&slot.key)?;

        match self.session.stage.clone() {
            Stage::AwaitingConfirmation { value } => self.answer(spec, &name, value, input),
            Stage::AwaitingValue => self.accept_value(spec, &name, input).await,
        }
    }

    /// Messages queued during the step, in send order.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.outbox
    }

    fn answer(
        &mut self,
        spec: &ParameterSpec,
        name: &str,
        value: JsonValue,
        input: &str,
    ) -> Result<Progress, SkillError> {
        let manager = ConfirmationManager::new(self.skill);
        match manager.classify(&value, input) {
            Reply::Affirmative => {
                debug!(parameter = name, "confirmed");
                self.commit(name, value)?;
                self.ask_next(false)
            }
            Reply::Negative => {
                manager.reject(self.session, name);
                self.ask_next(true)
            }
            Reply::Ambiguous => {
                debug!(parameter = name, "ambiguous reply, asking again");
                self.outbox.push(manager.prompt(spec, &value));
                Ok(Progress::Confirming(name.to_string()))
            }
        }
    }

    async fn accept_value(
        &mut self,
        spec: &ParameterSpec,
        name: &str,
        input: &str,
    ) -> Result<Progress, SkillError> {
        let parsed = match spec.parse(input) {
            Ok(value) => value,
            Err(e) => {
                let retries = self.session.bump_retry(name);
                debug!(parameter = name, reason = %e, retries, "input did not parse");
                let note = spec
                    .invalid_message()
                    .unwrap_or(&self.config.parse_error_message)
                    .to_string();
                self.outbox.push(Message::text(note));
                self.outbox.push(Message::text(spec.message()));
                return Ok(Progress::Asking(name.to_string()));
            }
        };

        let value = match spec.resolver_ref() {
            Some(resolver) => match self.resolve(resolver.as_ref(), name, parsed).await {
                Ok(value) => value,
                Err(e) => return Ok(self.resolution_failed(spec, name, &e)),
            },
            None => parsed,
        };

        if spec.requires_confirmation() {
            let manager = ConfirmationManager::new(self.skill);
            self.outbox.push(manager.prompt(spec, &value));
            self.session.stage = Stage::AwaitingConfirmation { value };
            Ok(Progress::Confirming(name.to_string()))
        } else {
            self.commit(name, value)?;
            self.ask_next(false)
        }
    }

    async fn resolve(
        &self,
        resolver: &dyn Resolver,
        name: &str,
        value: JsonValue,
    ) -> Result<JsonValue, ResolutionError> {
        let attempts = self.config.resolution_attempts.max(1);
        let limit = self.config.resolution_timeout();
        let mut attempt = 1;
        loop {
            let outcome = tokio::time::timeout(limit, resolver.reason(value.clone()))
                .await
                .unwrap_or_else(|_| {
                    Err(ResolutionError::Unavailable {
                        reason: format!("no answer within {}ms", self.config.resolution_timeout_ms),
                    })
                });
            match outcome {
                Ok(JsonValue::Null) => {
                    return Err(ResolutionError::NoMatch {
                        value: display_value(&value),
                    });
                }
                Ok(enriched) => return Ok(enriched),
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!(parameter = name, attempt, error = %e, "retrying resolution");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn resolution_failed(
        &mut self,
        spec: &ParameterSpec,
        name: &str,
        err: &ResolutionError,
    ) -> Progress {
        let failures = self.session.bump_resolution_failure(name);
        warn!(parameter = name, error = %err, failures, "resolution failed");

        if failures >= self.config.max_resolution_failures {
            self.session.resolution_failures.remove(name);
            self.outbox
                .push(Message::text(self.config.fallback_message.clone()));
        } else {
            let note = match err {
                ResolutionError::NoMatch { .. } => spec
                    .invalid_message()
                    .unwrap_or(self.config.parse_error_message.as_str()),
                ResolutionError::Unavailable { .. } => self.config.resolution_error_message.as_str(),
            };
            self.outbox.push(Message::text(note));
            self.outbox.push(Message::text(spec.message()));
        }
        Progress::Asking(name.to_string())
    }

    /// Commits a value and applies whatever the skill requests in response.
    fn commit(&mut self, name: &str, value: JsonValue) -> Result<(), SkillError> {
        if value.is_null() {
            warn!(parameter = name, "refusing to commit null");
            return Ok(());
        }

        self.session.confirmed.insert(name.to_string(), value);
        self.session.reset_counters(name);
        if self.session.confirming.as_deref() == Some(name) {
            self.session.confirming = None;
            self.session.stage = Stage::AwaitingValue;
        }
        self.session.refresh_to_confirm();
        debug!(parameter = name, "committed");

        let mut requests = CollectRequests::new();
        if let Some(value) = self.session.confirmed.get(name) {
            self.skill
                .hooks()
                .on_committed(name, value, &self.session.confirmed, &mut requests);
        }
        apply_requests(self.skill, self.session, requests)
    }

    /// Puts the next pending parameter at the head and asks for it.
    fn ask_next(&mut self, reask: bool) -> Result<Progress, SkillError> {
        self.session.refresh_to_confirm();
        let Some(name) = self.session.to_confirm.first().cloned() else {
            self.session.confirming = None;
            self.session.stage = Stage::AwaitingValue;
            debug!(skill = self.skill.name(), "all parameters collected");
            return Ok(Progress::Completed);
        };
        let key = self
            .session
            .slot(&name)
            .map_or_else(|| name.clone(), |slot| slot.key.clone());
        let spec = self.skill.require_spec(&key)?;
        self.session.confirming = Some(name.clone());

        if !reask {
            if let Some(proposal) = spec.propose(&self.session.confirmed) {
                let manager = ConfirmationManager::new(self.skill);
                self.outbox.push(manager.prompt(spec, &proposal));
                self.session.stage = Stage::AwaitingConfirmation { value: proposal };
                return Ok(Progress::Confirming(name));
            }
        }

        self.session.stage = Stage::AwaitingValue;
        let question = if reask {
            spec.reask_message()
        } else {
            spec.message()
        };
        self.outbox.push(Message::text(question));
        Ok(Progress::Asking(name))
    }
}

/// Merges dynamic collection requests into the session's parameter list.
///
/// Every key is checked before anything changes. A key whose parameter name
/// is already present replaces that entry's spec in place and keeps any
/// committed value; other keys are inserted in request order.
///
/// # Errors
///
/// Returns [`SkillError::UnknownParameter`] for a key outside the catalog.
pub fn apply_requests(
    skill: &SkillDefinition,
    session: &mut Session,
    requests: CollectRequests,
) -> Result<(), SkillError> {
    if requests.is_empty() {
        return Ok(());
    }
    let requests: Vec<_> = requests.into_requests().collect();
    for request in &requests {
        for key in &request.keys {
            skill.require_spec(key)?;
        }
    }

    for request in requests {
        let mut insert_at = match request.placement {
            Placement::Append => None,
            Placement::Next => Some(next_position(session)),
        };
        for key in &request.keys {
            let spec = skill.require_spec(key)?;
            if let Some(existing) = session
                .parameters
                .iter_mut()
                .find(|slot| slot.name == spec.name())
            {
                existing.key = spec.key().to_string();
                continue;
            }
            let slot = ParameterSlot {
                name: spec.name().to_string(),
                key: spec.key().to_string(),
            };
            match insert_at.as_mut() {
                Some(position) => {
                    session.parameters.insert(*position, slot);
                    *position += 1;
                }
                None => session.parameters.push(slot),
            }
        }
        debug!(keys = ?request.keys, placement = ?request.placement, "collecting parameters");
    }

    session.refresh_to_confirm();
    Ok(())
}

/// First position that is neither committed nor the parameter being asked.
fn next_position(session: &Session) -> usize {
    session
        .parameters
        .iter()
        .position(|slot| {
            !session.confirmed.contains_key(&slot.name)
                && session.confirming.as_deref() != Some(slot.name.as_str())
        })
        .unwrap_or(session.parameters.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use botdock_core::UserId;
    use serde_json::json;

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(Message::body).collect()
    }

    async fn step(
        skill: &SkillDefinition,
        session: &mut Session,
        config: &EngineConfig,
        input: &str,
    ) -> (Progress, Vec<Message>) {
        let mut collector = Collector::new(skill, session, config);
        let progress = collector.consume(input).await.expect("consume");
        assert!(session_ok(&collector));
        (progress, collector.into_messages())
    }

    fn session_ok(collector: &Collector<'_>) -> bool {
        collector.session.partition_holds()
    }

    fn started(skill: &SkillDefinition, config: &EngineConfig) -> (Session, Vec<Message>) {
        let mut session = Session::new(UserId::new("collect"));
        let mut collector = Collector::new(skill, &mut session, config);
        collector.begin(&BTreeMap::new()).expect("begin");
        let messages = collector.into_messages();
        (session, messages)
    }

    #[test]
    fn begin_asks_first_parameter() {
        let skill = fixtures::address_skill();
        let config = EngineConfig::default();
        let (session, messages) = started(&skill, &config);

        assert_eq!(session.confirming.as_deref(), Some("zip_code"));
        assert_eq!(session.to_confirm, vec!["zip_code", "city", "street"]);
        assert!(session.confirmed.is_empty());
        assert_eq!(texts(&messages), vec![fixtures::ZIP_CODE_QUESTION]);
    }

    #[tokio::test]
    async fn resolved_value_commits_and_city_is_proposed() {
        let skill = fixtures::address_skill();
        let config = EngineConfig::default();
        let (mut session, _) = started(&skill, &config);

        let (progress, messages) = step(&skill, &mut session, &config, "107-0061").await;

        assert_eq!(progress, Progress::Confirming("city".to_string()));
        assert_eq!(
            session.confirmed.get("zip_code"),
            Some(&json!({"zip_code": "107-0061", "resolved_address": "東京都港区北青山"}))
        );
        assert_eq!(session.to_confirm, vec!["city", "street"]);
        assert!(matches!(
            messages.as_slice(),
            [Message::Buttons { options, .. }] if options == &["はい", "いいえ"]
        ));
    }

    #[tokio::test]
    async fn parse_error_annotates_and_repeats() {
        let skill = fixtures::address_skill();
        let config = EngineConfig::default();
        let (mut session, _) = started(&skill, &config);

        let (progress, messages) = step(&skill, &mut session, &config, "abc").await;

        assert_eq!(progress, Progress::Asking("zip_code".to_string()));
        assert_eq!(
            texts(&messages),
            vec![fixtures::ZIP_CODE_INVALID, fixtures::ZIP_CODE_QUESTION]
        );
        assert_eq!(session.retries.get("zip_code"), Some(&1));
        assert!(session.confirmed.is_empty());
    }

    #[tokio::test]
    async fn unknown_zip_code_is_annotated() {
        let skill = fixtures::address_skill();
        let config = EngineConfig::default();
        let (mut session, _) = started(&skill, &config);

        let (progress, messages) = step(&skill, &mut session, &config, "9999999").await;

        assert_eq!(progress, Progress::Asking("zip_code".to_string()));
        assert_eq!(
            texts(&messages),
            vec![fixtures::ZIP_CODE_INVALID, fixtures::ZIP_CODE_QUESTION]
        );
    }

    #[tokio::test]
    async fn transient_resolution_is_retried_within_the_step() {
        let flaky = fixtures::FlakyResolver::failing(1);
        let skill = fixtures::flaky_skill(flaky.clone());
        let config = EngineConfig::default();
        let (mut session, _) = started(&skill, &config);

        let (progress, _) = step(&skill, &mut session, &config, "1070061").await;

        assert_eq!(progress, Progress::Completed);
        assert_eq!(flaky.calls(), 2);
        assert!(session.confirmed.contains_key("zip_code"));
    }

    #[tokio::test]
    async fn repeated_resolution_failures_escalate() {
        let flaky = fixtures::FlakyResolver::failing(usize::MAX);
        let skill = fixtures::flaky_skill(flaky.clone());
        let config = EngineConfig::default();
        let (mut session, _) = started(&skill, &config);

        for _ in 1..config.max_resolution_failures {
            let (_, messages) = step(&skill, &mut session, &config, "1070061").await;
            assert_eq!(
                texts(&messages),
                vec![config.resolution_error_message.as_str(), fixtures::ZIP_CODE_QUESTION]
            );
        }
        let (progress, messages) = step(&skill, &mut session, &config, "1070061").await;

        assert_eq!(progress, Progress::Asking("zip_code".to_string()));
        assert_eq!(texts(&messages), vec![config.fallback_message.as_str()]);
        assert!(session.resolution_failures.get("zip_code").is_none());
        assert_eq!(
            flaky.calls(),
            config.max_resolution_failures as usize * config.resolution_attempts as usize
        );
    }

    #[tokio::test]
    async fn parse_errors_do_not_spend_the_resolution_budget() {
        let skill = fixtures::flaky_skill(fixtures::FlakyResolver::failing(usize::MAX));
        let config = EngineConfig::default();
        let (mut session, _) = started(&skill, &config);

        step(&skill, &mut session, &config, "abc").await;
        step(&skill, &mut session, &config, "abc").await;
        let (progress, messages) = step(&skill, &mut session, &config, "1070061").await;

        assert_eq!(progress, Progress::Asking("zip_code".to_string()));
        assert_eq!(
            texts(&messages),
            vec![config.resolution_error_message.as_str(), fixtures::ZIP_CODE_QUESTION]
        );
        assert_eq!(session.retries.get("zip_code"), Some(&2));
        assert_eq!(session.resolution_failures.get("zip_code"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_resolver_is_cut_off_and_reprompted() {
        let skill = fixtures::slow_skill();
        let config = EngineConfig::default();
        let (mut session, _) = started(&skill, &config);

        let started_at = tokio::time::Instant::now();
        let (progress, messages) = step(&skill, &mut session, &config, "1070061").await;

        assert_eq!(progress, Progress::Asking("zip_code".to_string()));
        assert_eq!(
            texts(&messages),
            vec![config.resolution_error_message.as_str(), fixtures::ZIP_CODE_QUESTION]
        );
        assert!(started_at.elapsed() < config.step_timeout());
        assert!(session.confirmed.is_empty());
    }

    #[tokio::test]
    async fn negative_reply_reasks_with_reask_message() {
        let skill = fixtures::juminhyo_skill();
        let config = EngineConfig::default();
        let (mut session, _) = started(&skill, &config);

        step(&skill, &mut session, &config, "本人だけ").await;
        let (progress, _) = step(&skill, &mut session, &config, "中嶋一樹です").await;
        assert_eq!(progress, Progress::Confirming("name".to_string()));

        let (progress, messages) = step(&skill, &mut session, &config, "いいえ").await;
        assert_eq!(progress, Progress::Asking("name".to_string()));
        assert_eq!(texts(&messages), vec![fixtures::NAME_REASK]);
        assert_eq!(session.confirmed.get("juminhyo_type"), Some(&json!("本人だけ")));
    }

    #[tokio::test]
    async fn hook_appends_parameters_after_commit() {
        let skill = fixtures::juminhyo_skill();
        let config = EngineConfig::default();
        let (mut session, _) = started(&skill, &config);

        step(&skill, &mut session, &config, "本人だけ").await;
        step(&skill, &mut session, &config, "中嶋一樹です").await;
        let (progress, messages) = step(&skill, &mut session, &config, "はい").await;

        assert_eq!(progress, Progress::Asking("zip_code".to_string()));
        assert_eq!(session.to_confirm, vec!["zip_code", "city", "street"]);
        assert_eq!(session.confirmed.get("name"), Some(&json!("中嶋一樹")));
        assert_eq!(texts(&messages), vec![fixtures::JUMINHYO_ZIP_CODE_QUESTION]);
    }

    #[test]
    fn seeds_commit_plain_parameters_only() {
        let skill = fixtures::address_skill();
        let config = EngineConfig::default();
        let mut session = Session::new(UserId::new("collect"));
        let seeds = BTreeMap::from([
            ("street".to_string(), json!("2-5-8")),
            ("zip_code".to_string(), json!("1070061")),
        ]);

        let mut collector = Collector::new(&skill, &mut session, &config);
        let progress = collector.begin(&seeds).expect("begin");

        assert_eq!(progress, Progress::Asking("zip_code".to_string()));
        assert_eq!(session.confirmed.get("street"), Some(&json!("2-5-8")));
        assert!(!session.confirmed.contains_key("zip_code"));
        assert_eq!(session.to_confirm, vec!["zip_code", "city"]);
    }

    #[test]
    fn apply_requests_merges_without_duplicates() {
        let skill = fixtures::juminhyo_skill();
        let mut session = Session::new(UserId::new("juminhyo"));
        session.start_skill(&skill);
        session
            .confirmed
            .insert("juminhyo_type".to_string(), json!("本人だけ"));
        session.refresh_to_confirm();
        session.confirming = Some("name".to_string());

        let mut requests = CollectRequests::new();
        requests.collect_by_param(["zip_code", "city"]);
        requests.collect_by_param(["zip_code", "street"]);
        apply_requests(&skill, &mut session, requests).expect("apply");

        assert_eq!(session.to_confirm, vec!["name", "zip_code", "city", "street"]);
        assert_eq!(session.confirmed.get("juminhyo_type"), Some(&json!("本人だけ")));
        assert!(session.partition_holds());
    }

    #[test]
    fn collect_next_goes_behind_the_current_question() {
        let skill = fixtures::juminhyo_skill();
        let mut session = Session::new(UserId::new("juminhyo"));
        session.start_skill(&skill);
        session.confirming = Some("juminhyo_type".to_string());

        let mut requests = CollectRequests::new();
        requests.collect_next(["zip_code", "city"]);
        apply_requests(&skill, &mut session, requests).expect("apply");

        assert_eq!(
            session.to_confirm,
            vec!["juminhyo_type", "zip_code", "city", "name"]
        );
        assert!(session.partition_holds());
    }

    #[test]
    fn unknown_key_changes_nothing() {
        let skill = fixtures::juminhyo_skill();
        let mut session = Session::new(UserId::new("juminhyo"));
        session.start_skill(&skill);
        let before = session.parameters.clone();

        let mut requests = CollectRequests::new();
        requests.collect_by_param(["zip_code"]);
        requests.collect_by_param(["phone"]);
        let err = apply_requests(&skill, &mut session, requests).unwrap_err();

        assert!(matches!(err, SkillError::UnknownParameter { .. }));
        assert_eq!(session.parameters, before);
    }

    #[test]
    fn replacing_a_spec_keeps_its_value() {
        let skill = fixtures::juminhyo_skill();
        let mut session = Session::new(UserId::new("juminhyo"));
        session.start_skill(&skill);
        session.confirmed.insert("name".to_string(), json!("中嶋一樹"));
        session.refresh_to_confirm();

        let mut requests = CollectRequests::new();
        requests.collect_by_param(["name_kana"]);
        apply_requests(&skill, &mut session, requests).expect("apply");

        assert_eq!(session.slot("name").map(|s| s.key.as_str()), Some("name_kana"));
        assert_eq!(session.confirmed.get("name"), Some(&json!("中嶋一樹")));
        assert_eq!(session.parameters.len(), 2);
    }
}
