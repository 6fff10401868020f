//! Delivery of composed responses to a chat user.
//!
//! Delivery failures are reported to the caller, which logs them; they never
//! stop the engine.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use ragline_core::config::DeliveryConfig;
use ragline_core::error::{RaglineError, Result};

/// Sends a text message to a user.
pub trait DeliveryChannel: Send + Sync {
    fn deliver(&self, user_id: &str, text: &str) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage<'a> {
    user_id: &'a str,
    message: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    payload: TextPayload<'a>,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    text: &'a str,
}

/// Posts messages to a Botpress-style webhook.
#[derive(Debug, Clone)]
pub struct BotpressDelivery {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl BotpressDelivery {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RaglineError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl DeliveryChannel for BotpressDelivery {
    async fn deliver(&self, user_id: &str, text: &str) -> Result<()> {
        let message = OutgoingMessage {
            user_id,
            message: text,
            kind: "text",
            payload: TextPayload { text },
        };

        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RaglineError::Delivery(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RaglineError::Delivery(format!(
                "{} responded with HTTP status {}",
                self.endpoint, status
            )));
        }

        debug!(user_id, endpoint = %self.endpoint, "Message delivered");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

impl DeliveryChannel for LogDelivery {
    async fn deliver(&self, user_id: &str, text: &str) -> Result<()> {
        info!(user_id, message = text, "Response (no delivery endpoint configured)");
        Ok(())
    }
}

/// The delivery channel selected by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredDelivery {
    Botpress(BotpressDelivery),
    Log(LogDelivery),
}

impl ConfiguredDelivery {
    /// Botpress when an endpoint is configured, the log otherwise.
    ///
    /// The bearer token is read from the environment variable named by
    /// `token_env`; a missing variable means requests go out unauthenticated.
    pub fn from_config(config: &DeliveryConfig, timeout: Duration) -> Result<Self> {
        match &config.endpoint {
            Some(endpoint) => {
                let token = std::env::var(&config.token_env).ok().filter(|t| !t.is_empty());
                if token.is_none() {
                    debug!(token_env = %config.token_env, "No delivery token set");
                }
                Ok(Self::Botpress(BotpressDelivery::new(endpoint.clone(), token, timeout)?))
            }
            None => Ok(Self::Log(LogDelivery)),
        }
    }
}

impl DeliveryChannel for ConfiguredDelivery {
    async fn deliver(&self, user_id: &str, text: &str) -> Result<()> {
        match self {
            Self::Botpress(channel) => channel.deliver(user_id, text).await,
            Self::Log(channel) => channel.deliver(user_id, text).await,
        }
    }
}
