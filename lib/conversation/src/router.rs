//! Intent routing.
//!
//! A conversation is sticky: while the user's active skill still has
//! parameters to collect, events go straight to it. Only idle sessions
//! consult the NLU collaborator, and anything it cannot place lands on the
//! default skill.

use crate::error::{EngineError, NluError};
use crate::session::Session;
use async_trait::async_trait;
use botdock_core::UserId;
use botdock_skill::{SkillDefinition, SkillRegistry};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// What the NLU collaborator made of an utterance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Skill name, if any skill matched.
    pub name: Option<String>,
    /// Parameter values extracted from the utterance.
    #[serde(default)]
    pub parameters: Option<BTreeMap<String, JsonValue>>,
}

impl Intent {
    /// An intent naming a skill, without parameters.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            parameters: None,
        }
    }
}

/// Context handed to the NLU collaborator.
#[derive(Debug, Clone, Copy)]
pub struct NluContext<'a> {
    /// Who is talking.
    pub user_id: &'a UserId,
    /// The skill the user last talked to, if any.
    pub previous_skill: Option<&'a str>,
}

/// Intent classifier.
#[async_trait]
pub trait Nlu: Send + Sync {
    /// Classifies an utterance.
    async fn identify_intent(
        &self,
        text: &str,
        context: &NluContext<'_>,
    ) -> Result<Intent, NluError>;
}

/// Phrase-matching classifier.
///
/// Rules are checked in insertion order; the first phrase contained in the
/// utterance (case-insensitively) wins.
#[derive(Debug, Clone, Default)]
pub struct KeywordNlu {
    rules: Vec<(String, String)>,
}

impl KeywordNlu {
    /// Creates a classifier with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule mapping `phrase` to `skill`.
    #[must_use]
    pub fn with(mut self, phrase: impl Into<String>, skill: impl Into<String>) -> Self {
        self.rules.push((phrase.into().to_lowercase(), skill.into()));
        self
    }

    fn classify(&self, text: &str) -> Option<&str> {
        let text = text.to_lowercase();
        self.rules
            .iter()
            .find(|(phrase, _)| !phrase.is_empty() && text.contains(phrase.as_str()))
            .map(|(_, skill)| skill.as_str())
    }
}

impl<P, S> FromIterator<(P, S)> for KeywordNlu
where
    P: Into<String>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (P, S)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |nlu, (phrase, skill)| nlu.with(phrase, skill))
    }
}

#[async_trait]
impl Nlu for KeywordNlu {
    async fn identify_intent(
        &self,
        text: &str,
        _context: &NluContext<'_>,
    ) -> Result<Intent, NluError> {
        Ok(Intent {
            name: self.classify(text).map(ToString::to_string),
            parameters: None,
        })
    }
}

/// Where an event goes.
#[derive(Debug, Clone)]
pub struct Route {
    /// The skill handling the event.
    pub skill: Arc<SkillDefinition>,
    /// Values the NLU extracted for a freshly routed skill.
    pub seed_parameters: BTreeMap<String, JsonValue>,
    /// True when the skill starts over instead of continuing.
    pub fresh: bool,
}

/// Decides which skill handles an event.
pub struct IntentRouter {
    registry: Arc<SkillRegistry>,
    nlu: Arc<dyn Nlu>,
    default_skill: Arc<SkillDefinition>,
}

impl IntentRouter {
    /// Creates a router.
    ///
    /// # Errors
    ///
    /// Fails when `default_skill` is not registered.
    pub fn new(
        registry: Arc<SkillRegistry>,
        nlu: Arc<dyn Nlu>,
        default_skill: &str,
    ) -> Result<Self, Report<EngineError>> {
        let default_skill =
            registry
                .lookup(default_skill)
                .map_err(|e| EngineError::DefaultSkillMissing { name: e.name })?;
        Ok(Self {
            registry,
            nlu,
            default_skill,
        })
    }

    /// The skill used when nothing else matches.
    #[must_use]
    pub fn default_skill(&self) -> &Arc<SkillDefinition> {
        &self.default_skill
    }

    /// Routes an event's input against the user's session.
    ///
    /// Never fails: unknown skills and NLU errors fall back to the default
    /// skill.
    #[instrument(skip(self, input, session), fields(user_id = %session.user_id))]
    pub async fn route(&self, input: &str, session: &Session) -> Route {
        if session.is_in_progress() {
            if let Some(skill) = session
                .skill_name
                .as_deref()
                .and_then(|name| self.registry.lookup(name).ok())
            {
                debug!(skill = skill.name(), "continuing active skill");
                return Route {
                    skill,
                    seed_parameters: BTreeMap::new(),
                    fresh: false,
                };
            }
            warn!(
                skill = session.skill_name.as_deref().unwrap_or_default(),
                "active skill is no longer registered"
            );
        }

        let context = NluContext {
            user_id: &session.user_id,
            previous_skill: session.skill_name.as_deref(),
        };
        let intent = match self.nlu.identify_intent(input, &context).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "intent identification failed, using default skill");
                Intent::default()
            }
        };

        let skill = match intent.name.as_deref() {
            Some(name) => match self.registry.lookup(name) {
                Ok(skill) => skill,
                Err(e) => {
                    warn!(error = %e, "falling back to default skill");
                    Arc::clone(&self.default_skill)
                }
            },
            None => Arc::clone(&self.default_skill),
        };
        debug!(skill = skill.name(), "routed to skill");

        Route {
            skill,
            seed_parameters: intent.parameters.unwrap_or_default(),
            fresh: true,
        }
    }
}
