//! Outcome reports sent back to the service.
//!
//! 1 つのタスクにつき送るレポートは高々 1 つ（completed か failed のどちらか）。

use serde::{Deserialize, Serialize};

use super::errors::ActivityError;
use super::task::TaskToken;

/// Fixed `reason` for every failure report. Java clients on the other side
/// of the workflow read it as a generic runtime failure.
pub const FAILURE_REASON: &str = "java.lang.Exception";

/// Successful outcome of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub task_token: TaskToken,
    pub identity: String,
    /// JSON-encoded return value.
    pub result: Vec<u8>,
}

impl CompletionReport {
    pub fn new(task_token: TaskToken, identity: impl Into<String>, result: Vec<u8>) -> Self {
        Self {
            task_token,
            identity: identity.into(),
            result,
        }
    }
}

/// Body of `FailureReport::details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    #[serde(rename = "detailMessage")]
    pub detail_message: String,
    #[serde(rename = "class")]
    pub class: String,
}

impl FailureDetails {
    pub fn from_error(err: &ActivityError) -> Self {
        Self {
            detail_message: err.detail_message(),
            class: FAILURE_REASON.to_string(),
        }
    }
}

/// Failed outcome of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub task_token: TaskToken,
    pub identity: String,
    pub reason: String,
    /// JSON-encoded [`FailureDetails`].
    pub details: Vec<u8>,
}

impl FailureReport {
    pub fn new(
        task_token: TaskToken,
        identity: impl Into<String>,
        err: &ActivityError,
    ) -> Result<Self, serde_json::Error> {
        let details = serde_json::to_vec(&FailureDetails::from_error(err))?;
        Ok(Self {
            task_token,
            identity: identity.into(),
            reason: FAILURE_REASON.to_string(),
            details,
        })
    }

    pub fn decode_details(&self) -> Result<FailureDetails, serde_json::Error> {
        serde_json::from_slice(&self.details)
    }
}
