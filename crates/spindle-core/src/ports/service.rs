//! WorkflowService port - オーケストレーションサービスへの RPC
//!
//! activity worker が使う 3 つの呼び出し（poll / respond completed /
//! respond failed）と identity だけを定義します。transport（Thrift,
//! gRPC など）と wire encoding は実装側の責務です。
//!
//! # long poll
//! `poll_for_activity_task` はタスクが来るかサーバ側のタイムアウトまで
//! ブロックします。タイムアウト時は task_token が空のレスポンスを返し、
//! これはエラーではありません。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{
    ActivityTask, ActivityType, CompletionReport, ErrorKind, FailureReport, TaskToken,
    WorkflowExecution,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskListKind {
    #[default]
    Normal,
    Sticky,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub name: String,
    pub kind: Option<TaskListKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskListMetadata {
    pub max_tasks_per_second: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollForActivityTaskRequest {
    pub domain: String,
    pub task_list: Option<TaskList>,
    pub identity: String,
    pub task_list_metadata: Option<TaskListMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollForActivityTaskResponse {
    pub task_token: Vec<u8>,
    pub workflow_execution: Option<WorkflowExecution>,
    pub activity_id: String,
    pub activity_type: Option<ActivityType>,
    pub input: Option<Vec<u8>>,
    pub start_to_close_timeout_seconds: Option<i32>,
    pub attempt: i32,
}

impl PollForActivityTaskResponse {
    /// `None` when the poll timed out (empty task token).
    pub fn into_task(self) -> Option<ActivityTask> {
        if self.task_token.is_empty() {
            return None;
        }
        let start_to_close_timeout = self
            .start_to_close_timeout_seconds
            .filter(|s| *s > 0)
            .map(|s| Duration::from_secs(s as u64));
        Some(ActivityTask {
            task_token: TaskToken::new(self.task_token),
            activity_id: self.activity_id,
            activity_type: self
                .activity_type
                .unwrap_or_else(|| ActivityType::new("")),
            input: self.input.unwrap_or_default(),
            attempt: self.attempt,
            start_to_close_timeout,
            workflow_execution: self.workflow_execution,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondActivityTaskCompletedRequest {
    pub task_token: Vec<u8>,
    pub result: Option<Vec<u8>>,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondActivityTaskFailedRequest {
    pub task_token: Vec<u8>,
    pub reason: Option<String>,
    pub details: Option<Vec<u8>>,
    pub identity: String,
}

impl From<CompletionReport> for RespondActivityTaskCompletedRequest {
    fn from(report: CompletionReport) -> Self {
        Self {
            task_token: report.task_token.into_bytes(),
            result: Some(report.result),
            identity: report.identity,
        }
    }
}

impl From<FailureReport> for RespondActivityTaskFailedRequest {
    fn from(report: FailureReport) -> Self {
        Self {
            task_token: report.task_token.into_bytes(),
            reason: Some(report.reason),
            details: Some(report.details),
            identity: report.identity,
        }
    }
}

/// Errors returned by a [`WorkflowService`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service busy: {0}")]
    ServiceBusy(String),

    #[error("internal service error: {0}")]
    Internal(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("entity not exists: {0}")]
    EntityNotExists(String),

    #[error("access denied: {0}")]
    AccessDenied(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Transport(_) | ServiceError::Internal(_) => ErrorKind::Infrastructure,
            ServiceError::ServiceBusy(_) => ErrorKind::Transient,
            ServiceError::BadRequest(_)
            | ServiceError::EntityNotExists(_)
            | ServiceError::AccessDenied(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Activity-side calls of the orchestration service.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    /// Identifier of this process, included in every request.
    fn identity(&self) -> String;

    async fn poll_for_activity_task(
        &self,
        request: PollForActivityTaskRequest,
    ) -> Result<PollForActivityTaskResponse, ServiceError>;

    async fn respond_activity_task_completed(
        &self,
        request: RespondActivityTaskCompletedRequest,
    ) -> Result<(), ServiceError>;

    async fn respond_activity_task_failed(
        &self,
        request: RespondActivityTaskFailedRequest,
    ) -> Result<(), ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_token_is_not_a_task() {
        let resp = PollForActivityTaskResponse {
            activity_type: Some(ActivityType::new("Greeter::hello")),
            ..Default::default()
        };
        assert!(resp.into_task().is_none());
    }

    #[test]
    fn response_with_token_becomes_task() {
        let resp = PollForActivityTaskResponse {
            task_token: b"tok-1".to_vec(),
            activity_type: Some(ActivityType::new("Greeter::hello")),
            input: Some(br#"["World"]"#.to_vec()),
            start_to_close_timeout_seconds: Some(30),
            attempt: 2,
            ..Default::default()
        };
        let task = resp.into_task().unwrap();
        assert_eq!(task.task_token.to_string(), "tok-1");
        assert_eq!(task.activity_type.as_str(), "Greeter::hello");
        assert_eq!(task.input, br#"["World"]"#.to_vec());
        assert_eq!(task.start_to_close_timeout, Some(Duration::from_secs(30)));
        assert_eq!(task.attempt, 2);
    }

    #[test]
    fn failure_report_maps_onto_request() {
        let err = crate::domain::ActivityError::new("ValueError", "bad name");
        let report = FailureReport::new(TaskToken::from("tok-1"), "1@host", &err).unwrap();
        let req = RespondActivityTaskFailedRequest::from(report);
        assert_eq!(req.task_token, b"tok-1".to_vec());
        assert_eq!(req.reason.as_deref(), Some("java.lang.Exception"));
        assert_eq!(req.identity, "1@host");
        assert!(req.details.is_some());
    }

    #[rstest]
    #[case::transport(ServiceError::Transport("reset".into()), true)]
    #[case::busy(ServiceError::ServiceBusy("slow down".into()), true)]
    #[case::internal(ServiceError::Internal("oops".into()), true)]
    #[case::bad_request(ServiceError::BadRequest("no".into()), false)]
    #[case::no_domain(ServiceError::EntityNotExists("domain".into()), false)]
    #[case::denied(ServiceError::AccessDenied("nope".into()), false)]
    fn service_errors_are_classified(#[case] err: ServiceError, #[case] retryable: bool) {
        assert_eq!(err.is_retryable(), retryable);
    }
}
