//! Payloads exchanged with the caller and published on the bus.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("logs must contain at least one entry")]
    NoLogs,

    #[error("target_build cannot be empty")]
    EmptyTargetBuild,
}

/// Build submitted for analysis.
///
/// `logs` keeps the order the caller sent the entries in, only the first one
/// is ever analyzed.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BuildAnalysisRequest {
    /// Log name to log URL
    pub logs: IndexMap<String, String>,
    /// Identifier of the build in the caller's system, echoed in the outcome
    pub target_build: String,
    /// System where the build was launched
    pub build_system: String,
}

impl BuildAnalysisRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.logs.is_empty() {
            return Err(ValidationError::NoLogs);
        }

        if self.target_build.is_empty() {
            return Err(ValidationError::EmptyTargetBuild);
        }

        Ok(())
    }

    /// URL of the first log entry, by insertion order.
    pub fn first_log_url(&self) -> Option<&str> {
        self.logs.first().map(|(_, url)| url.as_str())
    }
}

/// Synchronous response to `POST /analyze`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AnalysisAcknowledgment {
    pub log_detective_analysis_id: Uuid,
}

/// The single message published for every accepted request.
#[derive(Clone, Debug, PartialEq)]
pub struct OutcomeMessage {
    pub topic: String,
    pub body: OutcomeBody,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OutcomeBody {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub target_build: String,
    pub log_detective_analysis_id: Uuid,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Outcome {
    Success {
        log_detective_response: serde_json::Value,
    },
    Failure {
        result: String,
    },
}

impl OutcomeMessage {
    pub fn success(
        topic: &str,
        request: &BuildAnalysisRequest,
        analysis_id: Uuid,
        response: serde_json::Value,
    ) -> Self {
        Self::new(
            topic,
            request,
            analysis_id,
            Outcome::Success {
                log_detective_response: response,
            },
        )
    }

    pub fn failure(
        topic: &str,
        request: &BuildAnalysisRequest,
        analysis_id: Uuid,
        result: String,
    ) -> Self {
        Self::new(topic, request, analysis_id, Outcome::Failure { result })
    }

    fn new(
        topic: &str,
        request: &BuildAnalysisRequest,
        analysis_id: Uuid,
        outcome: Outcome,
    ) -> Self {
        OutcomeMessage {
            topic: topic.to_string(),
            body: OutcomeBody {
                outcome,
                target_build: request.target_build.clone(),
                log_detective_analysis_id: analysis_id,
            },
        }
    }
}
