//! Conversation engine.
//!
//! One call to [`ConversationEngine::handle`] is one step: load the user's
//! session, route the event, run the collector on an in-memory copy, persist
//! it with a version check, then hand the outgoing messages to the
//! messenger. Steps for the same user are serialized by a per-user lock held
//! until delivery finishes; steps for different users never wait on each
//! other.

use crate::collector::{Collector, Progress, apply_requests};
use crate::config::EngineConfig;
use crate::error::{DeliveryError, EngineError, SessionStoreError};
use crate::event::Event;
use crate::response::Response;
use crate::router::{IntentRouter, Nlu, Route};
use crate::session::{Session, SessionStore};
use async_trait::async_trait;
use botdock_core::{Message, MessageRecord, StepId, UserId};
use botdock_skill::{CollectRequests, SkillRegistry};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{Span, debug, error, info, instrument, warn};

/// Sends messages back to the user on their platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Delivers `messages` in reply to `event`.
    async fn reply(
        &self,
        event: &Event,
        messages: &[Message],
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

/// What the messenger reports after a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub delivered: usize,
}

/// Outcome of handing a step's messages to the messenger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    /// The messenger accepted the messages.
    Delivered { count: usize },
    /// The step produced nothing to send.
    Skipped,
    /// The messenger failed. The step itself is committed.
    Failed { reason: String },
}

/// Result of one step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step_id: StepId,
    /// Projection of the stored session.
    pub response: Response,
    /// Messages produced by the step.
    pub messages: Vec<Message>,
    /// True when the step completed the active skill.
    pub completed: bool,
    pub delivery: Delivery,
}

/// One async mutex per user, created on demand.
///
/// Entries nobody holds or waits on are dropped on the next acquisition.
#[derive(Debug, Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(user_id.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Drives conversations.
pub struct ConversationEngine {
    store: Arc<dyn SessionStore>,
    registry: Arc<SkillRegistry>,
    router: IntentRouter,
    messenger: Arc<dyn Messenger>,
    config: EngineConfig,
    locks: UserLocks,
}

impl ConversationEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Fails when the configured default skill is not registered.
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: Arc<SkillRegistry>,
        nlu: Arc<dyn Nlu>,
        messenger: Arc<dyn Messenger>,
        config: EngineConfig,
    ) -> Result<Self, Report<EngineError>> {
        let router = IntentRouter::new(Arc::clone(&registry), nlu, &config.default_skill)?;
        info!(
            skills = ?registry.names(),
            default_skill = %config.default_skill,
            "conversation engine ready"
        );
        Ok(Self {
            store,
            registry,
            router,
            messenger,
            config,
            locks: UserLocks::default(),
        })
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Processes one inbound event.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionStore`] or [`EngineError::Timeout`]; in
    /// both cases nothing was committed and the event can be retried.
    /// Delivery failures are not errors; see [`StepOutcome::delivery`].
    #[instrument(skip_all, fields(user_id = %event.user_id, step_id))]
    pub async fn handle(&self, event: Event) -> Result<StepOutcome, Report<EngineError>> {
        let step_id = StepId::new();
        Span::current().record("step_id", tracing::field::display(&step_id));

        let _guard = self.locks.acquire(&event.user_id).await;

        let timeout = self.config.step_timeout();
        let (response, messages, completed) =
            match tokio::time::timeout(timeout, self.step(&event)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(after_ms = self.config.step_timeout_ms, "step timed out");
                    return Err(EngineError::Timeout {
                        user_id: event.user_id.clone(),
                        after_ms: self.config.step_timeout_ms,
                    }
                    .into());
                }
            };

        let delivery = self.deliver(&event, &messages).await;
        debug!(completed, confirming = ?response.confirming, "step finished");

        Ok(StepOutcome {
            step_id,
            response,
            messages,
            completed,
            delivery,
        })
    }

    /// Clears a user's session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionStore`] when the store fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn reset(&self, user_id: &UserId) -> Result<(), Report<EngineError>> {
        let _guard = self.locks.acquire(user_id).await;
        self.store
            .clear(user_id)
            .await
            .map_err(|e| store_failed(user_id, &e))?;
        info!("session cleared");
        Ok(())
    }

    /// Current projection of a user's session, without changing it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionStore`] when the store fails.
    pub async fn snapshot(&self, user_id: &UserId) -> Result<Option<Response>, Report<EngineError>> {
        let session = self
            .store
            .get(user_id)
            .await
            .map_err(|e| store_failed(user_id, &e))?;
        Ok(session.as_ref().map(Response::build))
    }

    /// Adds parameters to a user's active skill from outside a step.
    ///
    /// Nothing is asked here; the next event continues with the updated
    /// queue.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoActiveSkill`] when the user has no session
    /// or its skill is gone, and [`EngineError::InvalidCollection`] for keys
    /// the skill does not declare.
    #[instrument(skip(self, keys), fields(user_id = %user_id))]
    pub async fn collect_by_param(
        &self,
        user_id: &UserId,
        keys: impl IntoIterator<Item = impl Into<String>> + Send,
    ) -> Result<Response, Report<EngineError>> {
        let mut requests = CollectRequests::new();
        requests.collect_by_param(keys);

        let _guard = self.locks.acquire(user_id).await;
        let mut session = self
            .store
            .get(user_id)
            .await
            .map_err(|e| store_failed(user_id, &e))?
            .ok_or_else(|| EngineError::NoActiveSkill {
                user_id: user_id.clone(),
            })?;
        let skill = session
            .skill_name
            .as_deref()
            .and_then(|name| self.registry.lookup(name).ok())
            .ok_or_else(|| EngineError::NoActiveSkill {
                user_id: user_id.clone(),
            })?;

        apply_requests(&skill, &mut session, requests).map_err(|e| {
            warn!(error = %e, "rejected collection request");
            EngineError::InvalidCollection {
                user_id: user_id.clone(),
                skill: skill.name().to_string(),
            }
        })?;
        session.touch();

        let stored = self
            .store
            .set(session)
            .await
            .map_err(|e| store_failed(user_id, &e))?;
        Ok(Response::build(&stored))
    }

    /// Everything between load and store. Dropped as a whole on timeout.
    async fn step(
        &self,
        event: &Event,
    ) -> Result<(Response, Vec<Message>, bool), Report<EngineError>> {
        let user_id = &event.user_id;
        let mut session = self
            .store
            .get(user_id)
            .await
            .map_err(|e| store_failed(user_id, &e))?
            .unwrap_or_else(|| {
                debug!("starting new session");
                Session::new(user_id.clone())
            });

        let input = event.input();
        let route = self.router.route(input, &session).await;
        let (messages, completed) = self.run_skill(&route, &mut session, input).await;

        let records = event
            .as_message()
            .map(MessageRecord::from_user)
            .into_iter()
            .chain(messages.iter().cloned().map(MessageRecord::from_bot));
        session.record(records, self.config.history_limit);
        session.touch();

        let stored = self
            .store
            .set(session)
            .await
            .map_err(|e| store_failed(user_id, &e))?;
        Ok((Response::build(&stored), messages, completed))
    }

    async fn run_skill(
        &self,
        route: &Route,
        session: &mut Session,
        input: &str,
    ) -> (Vec<Message>, bool) {
        let skill = route.skill.as_ref();
        let mut collector = Collector::new(skill, session, &self.config);
        let progress = if route.fresh {
            collector.begin(&route.seed_parameters)
        } else {
            collector.consume(input).await
        };
        let mut messages = collector.into_messages();

        match progress {
            Ok(Progress::Completed) => {
                match skill.hooks().finish(&session.confirmed).await {
                    Ok(reply) => messages.extend(reply),
                    Err(e) => {
                        warn!(error = %e, "fulfillment failed");
                        messages.push(Message::text(self.config.fallback_message.clone()));
                    }
                }
                info!(skill = skill.name(), "skill completed");
                (messages, true)
            }
            Ok(_) => (messages, false),
            Err(e) => {
                error!(skill = skill.name(), error = %e, "skill state is inconsistent, resetting");
                session.abandon_skill();
                (vec![Message::text(self.config.fallback_message.clone())], false)
            }
        }
    }

    async fn deliver(&self, event: &Event, messages: &[Message]) -> Delivery {
        if messages.is_empty() {
            return Delivery::Skipped;
        }
        match self.messenger.reply(event, messages).await {
            Ok(receipt) => {
                debug!(delivered = receipt.delivered, "messages delivered");
                Delivery::Delivered {
                    count: receipt.delivered,
                }
            }
            Err(e) => {
                warn!(error = %e, "delivery failed");
                Delivery::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn store_failed(user_id: &UserId, err: &SessionStoreError) -> EngineError {
    error!(user_id = %user_id, error = %err, "session store operation failed");
    EngineError::SessionStore {
        user_id: user_id.clone(),
    }
}
