use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::domain::{ActivityTask, ActivityType, DispatchId, TaskToken, WorkflowExecution};

/// Execution context handed to an activity.
///
/// Cancellation is cooperative: the token fires when the task's deadline
/// passes or the worker is shutting down. An activity that ignores it is
/// aborted after the cancellation grace period.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    dispatch_id: DispatchId,
    activity_type: ActivityType,
    task_token: TaskToken,
    activity_id: String,
    attempt: i32,
    workflow_execution: Option<WorkflowExecution>,
    identity: String,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl ActivityContext {
    pub fn new(
        dispatch_id: DispatchId,
        task: &ActivityTask,
        identity: impl Into<String>,
        deadline: Option<Instant>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            dispatch_id,
            activity_type: task.activity_type.clone(),
            task_token: task.task_token.clone(),
            activity_id: task.activity_id.clone(),
            attempt: task.attempt,
            workflow_execution: task.workflow_execution.clone(),
            identity: identity.into(),
            deadline,
            cancellation,
        }
    }

    pub fn dispatch_id(&self) -> DispatchId {
        self.dispatch_id
    }

    pub fn activity_type(&self) -> &ActivityType {
        &self.activity_type
    }

    pub fn task_token(&self) -> &TaskToken {
        &self.task_token
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn attempt(&self) -> i32 {
        self.attempt
    }

    pub fn workflow_execution(&self) -> Option<&WorkflowExecution> {
        self.workflow_execution.as_ref()
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the activity should stop.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}
