//! Outbound notification contract.
//!
//! The engine decides what to send and when. Transport belongs to the
//! notifier, and a failed delivery is reported, never raised.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Push { device_type: String },
}

impl NotificationChannel {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Push { .. } => "push",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Email address or device token.
    pub destination: String,
    #[serde(flatten)]
    pub channel: NotificationChannel,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn email(destination: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            channel: NotificationChannel::Email,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: bool,
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Delivery;
}

/// Writes notifications to the log and reports them delivered.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn deliver(&self, notification: &Notification) -> Delivery {
        tracing::info!(
            channel = notification.channel.kind(),
            destination = %notification.destination,
            subject = %notification.subject,
            "Notification dispatched"
        );
        Delivery { delivered: true }
    }
}

/// Posts notifications to an HTTP notification service.
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
    api_key: Option<Secret<String>>,
}

impl HttpNotifier {
    pub fn new(endpoint: impl Into<String>, api_key: Option<Secret<String>>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url_for(&self, channel: &NotificationChannel) -> String {
        format!("{}/notifications/{}", self.endpoint, channel.kind())
    }

    async fn post(&self, notification: &Notification) -> Result<(), NotifierError> {
        let mut request = self
            .client
            .post(self.url_for(&notification.channel))
            .json(notification);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(&self, notification: &Notification) -> Delivery {
        match self.post(notification).await {
            Ok(()) => Delivery { delivered: true },
            Err(e) => {
                tracing::warn!(
                    channel = notification.channel.kind(),
                    error = %e,
                    "Notification delivery failed"
                );
                Delivery { delivered: false }
            }
        }
    }
}
