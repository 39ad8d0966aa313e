//! Outcome publication.
//!
//! Every bus write goes through [`OutcomePublisher`], which bounds the publish
//! with the configured timeout, logs failures and hands them back to the
//! caller. The transport itself is a [`BusClient`].

use crate::config::Bus as BusConfig;
use crate::metrics_defs::PUBLISH_FAILED;
use crate::model::OutcomeMessage;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(thiserror::Error, Debug, Clone)]
pub enum PublishError {
    #[error("message to {topic} was returned by the broker: {reason}")]
    Returned { topic: String, reason: String },

    #[error("publishing is forbidden ({0}): {1}")]
    Forbidden(String, String),

    #[error("bus operation timed out: {0}")]
    Timeout(String),

    #[error("message failed validation: {0}")]
    Validation(String),

    #[error("bus connection error: {0}")]
    Connection(String),
}

impl PublishError {
    /// Short label used as a metric tag
    pub fn reason(&self) -> &'static str {
        match self {
            PublishError::Returned { .. } => "returned",
            PublishError::Forbidden(..) => "forbidden",
            PublishError::Timeout(_) => "timeout",
            PublishError::Validation(_) => "validation",
            PublishError::Connection(_) => "connection",
        }
    }
}

/// Publish primitive of a message bus.
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn publish(&self, message: &OutcomeMessage) -> Result<(), PublishError>;

    async fn ping(&self) -> Result<(), PublishError>;
}

#[derive(Clone)]
pub struct OutcomePublisher {
    bus: Arc<dyn BusClient>,
    timeout: Duration,
}

impl OutcomePublisher {
    pub fn new(bus: Arc<dyn BusClient>, timeout: Duration) -> Self {
        OutcomePublisher { bus, timeout }
    }

    pub async fn publish(&self, message: &OutcomeMessage) -> Result<(), PublishError> {
        let result = match validate(message) {
            Ok(()) => timeout(self.timeout, self.bus.publish(message))
                .await
                .unwrap_or_else(|_| {
                    Err(PublishError::Timeout(format!(
                        "publishing to {} exceeded {:?}",
                        message.topic, self.timeout
                    )))
                }),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::error!(
                topic = %message.topic,
                analysis_id = %message.body.log_detective_analysis_id,
                target_build = %message.body.target_build,
                error = %e,
                "Publishing result failed"
            );
            crate::counter!(PUBLISH_FAILED, "reason" => e.reason()).increment(1);
        }

        result
    }

    pub async fn is_ready(&self) -> bool {
        matches!(
            timeout(self.timeout, self.bus.ping()).await,
            Ok(Ok(()))
        )
    }
}

/// Checks the message against the outcome schema before it reaches the bus.
fn validate(message: &OutcomeMessage) -> Result<(), PublishError> {
    if message.topic.is_empty() {
        return Err(PublishError::Validation("topic cannot be empty".into()));
    }

    if message.body.target_build.is_empty() {
        return Err(PublishError::Validation(
            "target_build cannot be empty".into(),
        ));
    }

    Ok(())
}

/// Redis publish/subscribe transport. The topic is used as the channel name
/// and the body is sent as JSON.
#[derive(Clone)]
pub struct RedisBus {
    conn: ConnectionManager,
    require_subscribers: bool,
}

impl RedisBus {
    pub async fn connect(config: &BusConfig) -> Result<Self, PublishError> {
        let client = redis::Client::open(config.url.as_str()).map_err(classify)?;
        let conn = timeout(config.timeout(), ConnectionManager::new(client))
            .await
            .map_err(|_| {
                PublishError::Timeout(format!("connecting exceeded {:?}", config.timeout()))
            })?
            .map_err(classify)?;

        Ok(RedisBus {
            conn,
            require_subscribers: config.require_subscribers,
        })
    }
}

#[async_trait]
impl BusClient for RedisBus {
    async fn publish(&self, message: &OutcomeMessage) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&message.body)
            .map_err(|e| PublishError::Validation(e.to_string()))?;

        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(&message.topic, payload)
            .await
            .map_err(classify)?;

        check_receivers(&message.topic, receivers, self.require_subscribers)?;

        tracing::debug!(topic = %message.topic, receivers, "Published outcome");
        Ok(())
    }

    async fn ping(&self) -> Result<(), PublishError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

/// A `PUBLISH` that reached nobody counts as returned by the broker only when
/// subscribers are required.
fn check_receivers(
    topic: &str,
    receivers: i64,
    require_subscribers: bool,
) -> Result<(), PublishError> {
    if receivers == 0 && require_subscribers {
        return Err(PublishError::Returned {
            topic: topic.to_string(),
            reason: "no subscribers".into(),
        });
    }
    Ok(())
}

fn classify(err: redis::RedisError) -> PublishError {
    if err.kind() == ErrorKind::AuthenticationFailed || err.code() == Some("NOPERM") {
        return PublishError::Forbidden(
            err.code().unwrap_or("AUTH").to_string(),
            err.to_string(),
        );
    }

    if err.is_timeout() {
        return PublishError::Timeout(err.to_string());
    }

    PublishError::Connection(err.to_string())
}
