use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TOPIC: &str = "org.fedoraproject.prod.logdetective.analysis";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Bus topic cannot be empty")]
    EmptyTopic,

    #[error("Timeout for {0} cannot be 0")]
    ZeroTimeout(&'static str),
}

/// Analysis handler configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for `POST /analyze`
    #[serde(default)]
    pub listener: Listener,
    /// Optional listener for the health and readiness probes
    pub admin_listener: Option<Listener>,
    pub log_detective: LogDetective,
    pub bus: Bus,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if let Some(admin_listener) = &self.admin_listener {
            admin_listener.validate()?;
        }

        if self.log_detective.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("log_detective"));
        }

        if self.bus.topic.is_empty() {
            return Err(ValidationError::EmptyTopic);
        }

        if self.bus.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("bus"));
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8090,
        }
    }
}

/// Connection details for the Log Detective analysis service
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LogDetective {
    /// Endpoint receiving `{"url": <log url>}`
    pub url: Url,
    /// Bearer token. An empty token is the same as no token.
    pub token: Option<String>,
    #[serde(default = "default_log_detective_timeout")]
    pub timeout_secs: u64,
}

impl LogDetective {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Message bus the outcome messages are published to
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Bus {
    pub url: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
    /// Treat a publish that reached no subscriber as returned by the broker.
    #[serde(default)]
    pub require_subscribers: bool,
}

impl Bus {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_log_detective_timeout() -> u64 {
    107
}

fn default_publish_timeout() -> u64 {
    30
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}
