pub mod api;
pub mod config;
pub mod dispatcher;
pub mod metrics_defs;
pub mod model;
pub mod publisher;

#[cfg(test)]
mod testutils;

use api::AppState;
use dispatcher::Dispatcher;
use publisher::{OutcomePublisher, PublishError, RedisBus};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum AnalysisHandlerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] config::ValidationError),

    #[error("could not connect to the message bus: {0}")]
    Bus(#[from] PublishError),

    #[error("could not build the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub async fn run(config: config::Config) -> Result<(), AnalysisHandlerError> {
    config.validate()?;

    let bus = RedisBus::connect(&config.bus).await?;
    let publisher = OutcomePublisher::new(Arc::new(bus), config.bus.timeout());
    let dispatcher = Dispatcher::new(config.log_detective, config.bus.topic, publisher)?;
    let state = AppState::new(Arc::new(dispatcher));

    let api_task = serve(&config.listener, api::router(state.clone()));

    match &config.admin_listener {
        Some(admin_listener) => {
            let admin_task = serve(admin_listener, api::admin_router(state));
            tokio::try_join!(api_task, admin_task)?;
        }
        None => api_task.await?,
    }

    Ok(())
}

async fn serve(listener: &config::Listener, app: axum::Router) -> Result<(), AnalysisHandlerError> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let tcp_listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(tcp_listener, app).await?;
    Ok(())
}
