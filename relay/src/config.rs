use analysis_handler::config::{Config as AnalysisHandlerConfig, ValidationError};
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize, Debug)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, Default)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// Default `EnvFilter` directive, `RUST_LOG` takes precedence
    pub filter: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub analysis_handler: AnalysisHandlerConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.analysis_handler.validate()?;

        Ok(config)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Validation(#[from] ValidationError),
}
