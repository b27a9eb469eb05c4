//! Skill definitions.
//!
//! A definition is built once at startup and never mutated afterwards. The
//! per-conversation effective parameter list (which grows when skills
//! collect parameters dynamically) lives in the session, referencing specs
//! in the definition's catalog by key.

use crate::error::{FulfillmentError, SkillError};
use crate::parameter::ParameterSpec;
use crate::rejection::RejectionGraph;
use async_trait::async_trait;
use botdock_core::Message;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Words a skill accepts as yes/no answers to a confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    affirmative: Vec<String>,
    negative: Vec<String>,
}

impl Vocabulary {
    /// Creates a vocabulary. The first entry of each list labels the
    /// corresponding button.
    #[must_use]
    pub fn new(
        affirmative: impl IntoIterator<Item = impl Into<String>>,
        negative: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            affirmative: affirmative.into_iter().map(Into::into).collect(),
            negative: negative.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `Some(true)` for an affirmative reply, `Some(false)` for a
    /// negative one and `None` when the reply is neither.
    #[must_use]
    pub fn classify(&self, reply: &str) -> Option<bool> {
        let reply = reply.trim().to_lowercase();
        let matches = |words: &[String]| words.iter().any(|w| w.to_lowercase() == reply);
        if matches(&self.affirmative) {
            Some(true)
        } else if matches(&self.negative) {
            Some(false)
        } else {
            None
        }
    }

    /// Label of the "yes" button.
    #[must_use]
    pub fn yes_label(&self) -> &str {
        self.affirmative.first().map_or("yes", String::as_str)
    }

    /// Label of the "no" button.
    #[must_use]
    pub fn no_label(&self) -> &str {
        self.negative.first().map_or("no", String::as_str)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(
            ["はい", "yes", "y", "ok", "うん"],
            ["いいえ", "no", "n", "いや", "違います"],
        )
    }
}

/// Where dynamically requested parameters go in the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// After every existing pending parameter.
    Append,
    /// Ahead of every pending parameter other than the one being asked.
    Next,
}

/// One dynamic collection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectRequest {
    /// Catalog keys, in the order the skill wants them collected.
    pub keys: Vec<String>,
    /// Where they are inserted.
    pub placement: Placement,
}

/// Dynamic collection requests issued by skill logic during a step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectRequests {
    requests: Vec<CollectRequest>,
}

impl CollectRequests {
    /// Creates an empty request list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends parameters after everything already pending.
    pub fn collect_by_param(&mut self, keys: impl IntoIterator<Item = impl Into<String>>) {
        self.push(keys, Placement::Append);
    }

    /// Inserts parameters so they are asked next.
    pub fn collect_next(&mut self, keys: impl IntoIterator<Item = impl Into<String>>) {
        self.push(keys, Placement::Next);
    }

    fn push(&mut self, keys: impl IntoIterator<Item = impl Into<String>>, placement: Placement) {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if !keys.is_empty() {
            self.requests.push(CollectRequest { keys, placement });
        }
    }

    /// Returns true if nothing was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Consumes the list, yielding requests in issue order.
    pub fn into_requests(self) -> impl Iterator<Item = CollectRequest> {
        self.requests.into_iter()
    }
}

/// Skill logic that runs inside the engine.
#[async_trait]
pub trait SkillHooks: Send + Sync {
    /// Called after a parameter is committed. Skills add parameters here.
    fn on_committed(
        &self,
        _parameter: &str,
        _value: &JsonValue,
        _confirmed: &BTreeMap<String, JsonValue>,
        _requests: &mut CollectRequests,
    ) {
    }

    /// Called once every parameter is committed; returns the messages to
    /// send back to the user.
    async fn finish(
        &self,
        _confirmed: &BTreeMap<String, JsonValue>,
    ) -> Result<Vec<Message>, FulfillmentError> {
        Ok(Vec::new())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl SkillHooks for NoHooks {}

/// An immutable skill definition.
pub struct SkillDefinition {
    name: String,
    required: Vec<String>,
    catalog: HashMap<String, Arc<ParameterSpec>>,
    vocabulary: Vocabulary,
    hooks: Arc<dyn SkillHooks>,
    rejection: RejectionGraph,
}

impl SkillDefinition {
    /// Starts building a definition.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SkillDefinitionBuilder {
        SkillDefinitionBuilder {
            name: name.into(),
            required: Vec::new(),
            optional: Vec::new(),
            vocabulary: Vocabulary::default(),
            hooks: Arc::new(NoHooks),
        }
    }

    /// Skill name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Required parameters in declared order.
    pub fn required_parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.required
            .iter()
            .filter_map(|key| self.catalog.get(key).map(AsRef::as_ref))
    }

    /// Looks up a spec by catalog key.
    #[must_use]
    pub fn spec(&self, key: &str) -> Option<&ParameterSpec> {
        self.catalog.get(key).map(AsRef::as_ref)
    }

    /// Looks up a spec by catalog key, failing for unknown keys.
    pub fn require_spec(&self, key: &str) -> Result<&ParameterSpec, SkillError> {
        self.spec(key).ok_or_else(|| SkillError::UnknownParameter {
            skill: self.name.clone(),
            key: key.to_string(),
        })
    }

    /// Yes/no vocabulary.
    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Skill hooks.
    #[must_use]
    pub fn hooks(&self) -> &dyn SkillHooks {
        self.hooks.as_ref()
    }

    /// Rejection graph over parameter names.
    #[must_use]
    pub fn rejection(&self) -> &RejectionGraph {
        &self.rejection
    }
}

impl fmt::Debug for SkillDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillDefinition")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("catalog_size", &self.catalog.len())
            .field("vocabulary", &self.vocabulary)
            .finish()
    }
}

/// Builder for [`SkillDefinition`].
pub struct SkillDefinitionBuilder {
    name: String,
    required: Vec<ParameterSpec>,
    optional: Vec<ParameterSpec>,
    vocabulary: Vocabulary,
    hooks: Arc<dyn SkillHooks>,
}

impl SkillDefinitionBuilder {
    /// Adds a required parameter; declaration order is collection order.
    #[must_use]
    pub fn required(mut self, spec: ParameterSpec) -> Self {
        self.required.push(spec);
        self
    }

    /// Adds a parameter that is only collected when requested dynamically.
    #[must_use]
    pub fn optional(mut self, spec: ParameterSpec) -> Self {
        self.optional.push(spec);
        self
    }

    /// Replaces the default yes/no vocabulary.
    #[must_use]
    pub fn vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Installs skill hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn SkillHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validates the definition and computes its rejection graph.
    ///
    /// # Errors
    ///
    /// Returns an error if catalog keys or required names repeat, or if a
    /// dependency names a parameter no spec provides.
    pub fn build(self) -> Result<SkillDefinition, SkillError> {
        let mut catalog = HashMap::new();
        let mut required = Vec::with_capacity(self.required.len());
        let mut required_names = Vec::with_capacity(self.required.len());

        for spec in &self.required {
            if required_names.contains(&spec.name()) {
                return Err(SkillError::DuplicateParameter {
                    skill: self.name.clone(),
                    key: spec.name().to_string(),
                });
            }
            required_names.push(spec.name());
            required.push(spec.key().to_string());
        }

        for spec in self.required.iter().chain(&self.optional) {
            let key = spec.key().to_string();
            if catalog.contains_key(&key) {
                return Err(SkillError::DuplicateParameter {
                    skill: self.name.clone(),
                    key,
                });
            }
            catalog.insert(key, Arc::new(spec.clone()));
        }

        let rejection = RejectionGraph::from_specs(&self.name, catalog.values().map(AsRef::as_ref))?;

        Ok(SkillDefinition {
            name: self.name,
            required,
            catalog,
            vocabulary: self.vocabulary,
            hooks: self.hooks,
            rejection,
        })
    }
}
