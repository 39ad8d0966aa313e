use crate::config::LogDetective as LogDetectiveConfig;
use crate::metrics_defs::{ANALYSIS_OUTCOME, DISPATCH_FAILED, UPSTREAM_DURATION};
use crate::model::{BuildAnalysisRequest, OutcomeMessage, ValidationError};
use crate::publisher::{OutcomePublisher, PublishError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Why Log Detective did not produce an analysis.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("request is not analyzable: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("Log Detective answered with an HTTP status error: {0}")]
    HttpStatus(reqwest::Error),

    #[error("request to Log Detective failed: {0}")]
    Transport(reqwest::Error),

    #[error("decoding response from Log Detective failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Human readable `result` of the failure outcome message.
    fn outcome_result(&self) -> String {
        match self {
            AnalysisError::HttpStatus(e) => {
                format!("Build analysis failed with HTTP status error `{e}`")
            }
            AnalysisError::Transport(e) => format!("Build analysis failed with `{e}`"),
            AnalysisError::InvalidRequest(e) => format!("Build analysis failed with `{e}`"),
            AnalysisError::Decode(e) => {
                format!("Decoding response from Log Detective failed with `{e}`")
            }
        }
    }

    fn outcome_tag(&self) -> &'static str {
        match self {
            AnalysisError::HttpStatus(_) => "http_status_error",
            AnalysisError::Transport(_) => "transport_error",
            AnalysisError::InvalidRequest(_) => "invalid_request",
            AnalysisError::Decode(_) => "decode_error",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("publishing outcome failed: {0}")]
    Publish(#[from] PublishError),
}

#[derive(Serialize)]
struct AnalyzeLog<'a> {
    url: &'a str,
}

/// Forwards a build log to Log Detective and publishes what came back.
///
/// Whatever happens to the upstream call, exactly one outcome message is
/// handed to the publisher per dispatch.
pub struct Dispatcher {
    client: reqwest::Client,
    log_detective: LogDetectiveConfig,
    topic: String,
    publisher: OutcomePublisher,
}

impl Dispatcher {
    pub fn new(
        log_detective: LogDetectiveConfig,
        topic: String,
        publisher: OutcomePublisher,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(log_detective.timeout())
            .build()?;

        Ok(Dispatcher {
            client,
            log_detective,
            topic,
            publisher,
        })
    }

    pub fn publisher(&self) -> &OutcomePublisher {
        &self.publisher
    }

    pub async fn dispatch(
        &self,
        request: &BuildAnalysisRequest,
        analysis_id: Uuid,
    ) -> Result<(), DispatchError> {
        let (message, error) = match self.call_log_detective(request).await {
            Ok(response) => {
                crate::counter!(ANALYSIS_OUTCOME, "outcome" => "success").increment(1);
                let message = OutcomeMessage::success(&self.topic, request, analysis_id, response);
                (message, None)
            }
            Err(e) => {
                tracing::error!(
                    url = %self.log_detective.url,
                    error = %e,
                    "Request to Log Detective API failed"
                );
                crate::counter!(ANALYSIS_OUTCOME, "outcome" => e.outcome_tag()).increment(1);
                let message =
                    OutcomeMessage::failure(&self.topic, request, analysis_id, e.outcome_result());
                (message, Some(e))
            }
        };

        self.publisher.publish(&message).await?;

        match error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn call_log_detective(
        &self,
        request: &BuildAnalysisRequest,
    ) -> Result<serde_json::Value, AnalysisError> {
        request.validate()?;
        let log_url = request
            .first_log_url()
            .ok_or(ValidationError::NoLogs)?;

        let mut builder = self
            .client
            .post(self.log_detective.url.clone())
            .json(&AnalyzeLog { url: log_url });

        // Only when the Log Detective server requires authorization
        if let Some(token) = self.log_detective.token() {
            builder = builder.bearer_auth(token);
        }

        let start = Instant::now();
        let response = builder.send().await;
        crate::histogram!(UPSTREAM_DURATION).record(start.elapsed().as_secs_f64());

        let response = response
            .map_err(AnalysisError::Transport)?
            .error_for_status()
            .map_err(AnalysisError::HttpStatus)?;

        let body = response.bytes().await.map_err(AnalysisError::Transport)?;

        Ok(serde_json::from_slice(&body)?)
    }
}

/// Runs the dispatch as a detached task.
///
/// The caller is not expected to await the handle. Failures are reported
/// from inside the task through the log and the `dispatch.failed` counter.
pub fn spawn_dispatch(
    dispatcher: Arc<Dispatcher>,
    request: BuildAnalysisRequest,
    analysis_id: Uuid,
) -> JoinHandle<Result<(), DispatchError>> {
    let span = tracing::info_span!(
        "dispatch",
        %analysis_id,
        target_build = %request.target_build,
        build_system = %request.build_system,
    );

    tokio::spawn(
        async move {
            let result = dispatcher.dispatch(&request, analysis_id).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "Build analysis dispatch failed");
                crate::counter!(DISPATCH_FAILED).increment(1);
            }
            result
        }
        .instrument(span),
    )
}
