//! InMemoryService - 開発・テスト用の WorkflowService
//!
//! # 学習ポイント
//! - tokio の Mutex + Notify による long poll
//! - Notify は lock を外してから鳴らす
//! - 失敗の台本（fail_next_poll / fail_next_response）でエラー経路を再現
//!
//! poll はタスクが積まれるか `poll_timeout` が過ぎるまで待ち、
//! タイムアウト時は task_token が空のレスポンスを返す（本物のサービスと同じ）。

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{ActivityType, TaskToken};
use crate::ports::{
    PollForActivityTaskRequest, PollForActivityTaskResponse, RespondActivityTaskCompletedRequest,
    RespondActivityTaskFailedRequest, ServiceError, WorkflowService, process_identity,
};
use crate::typed::{CodecError, PayloadCodec};

#[derive(Default)]
struct ServiceState {
    tasks: VecDeque<PollForActivityTaskResponse>,
    poll_failures: VecDeque<ServiceError>,
    response_failures: VecDeque<ServiceError>,
    poll_requests: Vec<PollForActivityTaskRequest>,
    completed: Vec<RespondActivityTaskCompletedRequest>,
    failed: Vec<RespondActivityTaskFailedRequest>,
}

impl ServiceState {
    fn responses(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// InMemoryService は 1 プロセス内で完結するサービス
///
/// # 使用例
/// ```ignore
/// let service = Arc::new(InMemoryService::new());
/// service.enqueue("tok-1", "Greeter::hello", br#"["World"]"#).await;
/// // worker を起動して...
/// service.wait_for_responses(1, Duration::from_secs(1)).await;
/// assert_eq!(service.completed().await.len(), 1);
/// ```
pub struct InMemoryService {
    identity: String,
    poll_timeout: Duration,
    state: Mutex<ServiceState>,
    /// push 時の通知（poll 待ち用）
    task_ready: Notify,
    /// poll / 応答の記録時の通知（テストの待ち合わせ用）
    changed: Notify,
}

impl InMemoryService {
    pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self::with_poll_timeout(Self::DEFAULT_POLL_TIMEOUT)
    }

    pub fn with_poll_timeout(poll_timeout: Duration) -> Self {
        Self {
            identity: process_identity(),
            poll_timeout,
            state: Mutex::new(ServiceState::default()),
            task_ready: Notify::new(),
            changed: Notify::new(),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub async fn push_task(&self, response: PollForActivityTaskResponse) {
        self.state.lock().await.tasks.push_back(response);
        self.task_ready.notify_one();
    }

    /// Queue a task with JSON-array `input`.
    pub async fn enqueue(
        &self,
        task_token: impl Into<TaskToken>,
        activity_type: impl Into<ActivityType>,
        input: impl Into<Vec<u8>>,
    ) {
        let task_token: TaskToken = task_token.into();
        self.push_task(PollForActivityTaskResponse {
            activity_id: task_token.to_string(),
            task_token: task_token.into_bytes(),
            activity_type: Some(activity_type.into()),
            input: Some(input.into()),
            ..Default::default()
        })
        .await;
    }

    /// [`enqueue`](Self::enqueue) with typed positional arguments, e.g. `&("World",)`.
    pub async fn enqueue_args<T: Serialize + ?Sized>(
        &self,
        task_token: impl Into<TaskToken>,
        activity_type: impl Into<ActivityType>,
        args: &T,
    ) -> Result<(), CodecError> {
        let input = PayloadCodec::encode_args(args)?;
        self.enqueue(task_token, activity_type, input).await;
        Ok(())
    }

    /// The next poll fails with `err` instead of returning a task.
    pub async fn fail_next_poll(&self, err: ServiceError) {
        self.state.lock().await.poll_failures.push_back(err);
        self.task_ready.notify_one();
    }

    /// The next completed/failed response fails with `err` (and is not recorded).
    pub async fn fail_next_response(&self, err: ServiceError) {
        self.state.lock().await.response_failures.push_back(err);
    }

    pub async fn completed(&self) -> Vec<RespondActivityTaskCompletedRequest> {
        self.state.lock().await.completed.clone()
    }

    pub async fn failed(&self) -> Vec<RespondActivityTaskFailedRequest> {
        self.state.lock().await.failed.clone()
    }

    pub async fn poll_requests(&self) -> Vec<PollForActivityTaskRequest> {
        self.state.lock().await.poll_requests.clone()
    }

    pub async fn poll_count(&self) -> usize {
        self.state.lock().await.poll_requests.len()
    }

    pub async fn pending_tasks(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    /// Wait until at least `n` responses were recorded. `false` on timeout.
    pub async fn wait_for_responses(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.responses() >= n).await
    }

    /// Wait until at least `n` polls were received. `false` on timeout.
    pub async fn wait_for_polls(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.poll_requests.len() >= n).await
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn(&ServiceState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if done(&*self.state.lock().await) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return done(&*self.state.lock().await);
            }
        }
    }

    async fn record_response(
        &self,
        record: impl FnOnce(&mut ServiceState),
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.response_failures.pop_front() {
            return Err(err);
        }
        record(&mut *state);
        drop(state);
        self.changed.notify_waiters();
        Ok(())
    }
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowService for InMemoryService {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn poll_for_activity_task(
        &self,
        request: PollForActivityTaskRequest,
    ) -> Result<PollForActivityTaskResponse, ServiceError> {
        self.state.lock().await.poll_requests.push(request);
        self.changed.notify_waiters();

        let deadline = Instant::now() + self.poll_timeout;
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(err) = state.poll_failures.pop_front() {
                    return Err(err);
                }
                if let Some(task) = state.tasks.pop_front() {
                    return Ok(task);
                }
            }
            tokio::select! {
                _ = self.task_ready.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Ok(PollForActivityTaskResponse::default());
                }
            }
        }
    }

    async fn respond_activity_task_completed(
        &self,
        request: RespondActivityTaskCompletedRequest,
    ) -> Result<(), ServiceError> {
        self.record_response(|s| s.completed.push(request)).await
    }

    async fn respond_activity_task_failed(
        &self,
        request: RespondActivityTaskFailedRequest,
    ) -> Result<(), ServiceError> {
        self.record_response(|s| s.failed.push(request)).await
    }
}
