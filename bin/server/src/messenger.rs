//! Messenger implementations.
//!
//! Platform payload compilation lives outside botdock; these messengers
//! hand platform-agnostic messages to whatever sits downstream.

use async_trait::async_trait;
use botdock_conversation::{DeliveryError, DeliveryReceipt, Event, Messenger};
use botdock_core::{Message, UserId};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Logs replies instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn reply(
        &self,
        event: &Event,
        messages: &[Message],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        for message in messages {
            info!(user_id = %event.user_id, text = message.body(), "reply");
        }
        Ok(DeliveryReceipt {
            delivered: messages.len(),
        })
    }
}

/// Body POSTed to the callback URL.
#[derive(Debug, Serialize)]
struct CallbackPayload<'a> {
    user_id: &'a UserId,
    messages: &'a [Message],
}

/// POSTs replies as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct CallbackMessenger {
    client: reqwest::Client,
    url: String,
}

impl CallbackMessenger {
    /// Creates a messenger posting to `url`.
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Messenger for CallbackMessenger {
    #[instrument(skip_all, fields(user_id = %event.user_id, url = %self.url))]
    async fn reply(
        &self,
        event: &Event,
        messages: &[Message],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let payload = CallbackPayload {
            user_id: &event.user_id,
            messages,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Unreachable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }

        debug!(count = messages.len(), "callback accepted reply");
        Ok(DeliveryReceipt {
            delivered: messages.len(),
        })
    }
}
