//! TaskLoop - poll → dispatch → respond を繰り返す
//!
//! # 学習ポイント
//! - poll の前に Semaphore の permit を取る（さばけないタスクを受け取らない）
//! - 1 タスク = 1 tokio task（JoinSet で管理、終了時に drain）
//! - shutdown は CancellationToken。待ちになる箇所は全て select で競合させる
//! - エラーは分類して扱う: retryable なら backoff、terminal ならループ終了
//!
//! 応答の送信エラーはログに残すだけでリトライしない。

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::backoff::PollBackoff;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::stats::WorkerStats;
use super::worker::WorkerError;
use crate::domain::{ActivityError, ActivityTask, CompletionReport, FailureReport};
use crate::ports::{PollForActivityTaskRequest, WorkflowService};

pub(crate) struct TaskLoop {
    pub(crate) service: Arc<dyn WorkflowService>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) request: PollForActivityTaskRequest,
    pub(crate) backoff: PollBackoff,
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) stats: Arc<WorkerStats>,
    pub(crate) shutdown: CancellationToken,
}

impl TaskLoop {
    pub(crate) async fn run(self) -> Result<(), WorkerError> {
        let mut in_flight = JoinSet::new();
        let mut consecutive_failures: u32 = 0;

        let result = loop {
            while let Some(joined) = in_flight.try_join_next() {
                log_join_error(joined);
            }

            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let started = Instant::now();
            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                polled = self.service.poll_for_activity_task(self.request.clone()) => polled,
            };
            let latency = started.elapsed();
            self.stats.record_poll(latency);
            debug!(latency_ms = latency.as_millis() as u64, "PollForActivityTask");

            let response = match polled {
                Ok(response) => {
                    consecutive_failures = 0;
                    response
                }
                Err(err) if err.is_retryable() => {
                    self.stats.record_poll_error();
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    let delay = self
                        .backoff
                        .jittered_delay_for(consecutive_failures, &mut rand::thread_rng());
                    error!(
                        error = %err,
                        consecutive_failures,
                        backoff_ms = delay.as_millis() as u64,
                        "PollForActivityTask error"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
                Err(err) => {
                    self.stats.record_poll_error();
                    error!(error = %err, "PollForActivityTask failed with a terminal error, stopping");
                    break Err(WorkerError::Terminal(err));
                }
            };

            let Some(task) = response.into_task() else {
                self.stats.record_empty_poll();
                debug!("PollForActivityTask has no task_token (expected): no tasks in the queue");
                continue;
            };

            self.stats.task_started();
            let unit = ExecutionUnit {
                service: Arc::clone(&self.service),
                dispatcher: Arc::clone(&self.dispatcher),
                identity: self.request.identity.clone(),
                stats: Arc::clone(&self.stats),
                shutdown: self.shutdown.clone(),
            };
            in_flight.spawn(unit.run(task, permit));
        };

        // ループを抜けたら in-flight の activity にも止まってもらう
        self.shutdown.cancel();
        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "waiting for in-flight activities");
        }
        while let Some(joined) = in_flight.join_next().await {
            log_join_error(joined);
        }
        result
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "activity execution unit did not finish cleanly");
    }
}

/// Everything one received task needs after it leaves the loop.
struct ExecutionUnit {
    service: Arc<dyn WorkflowService>,
    dispatcher: Arc<Dispatcher>,
    identity: String,
    stats: Arc<WorkerStats>,
    shutdown: CancellationToken,
}

impl ExecutionUnit {
    async fn run(self, task: ActivityTask, permit: OwnedSemaphorePermit) {
        let span = info_span!(
            "activity",
            activity_type = %task.activity_type,
            task_token = %task.task_token,
            attempt = task.attempt,
        );
        async move {
            let started = Instant::now();
            info!("activity task received");

            match self.dispatcher.dispatch(&task, &self.shutdown).await {
                DispatchOutcome::Completed(result) => {
                    self.stats.record_completed();
                    let report =
                        CompletionReport::new(task.task_token.clone(), self.identity.clone(), result);
                    self.respond_completed(report).await;
                }
                DispatchOutcome::Failed(err) => {
                    self.stats.record_failed();
                    warn!(error = %err, "activity failed");
                    self.respond_failed(&task, &err).await;
                }
                DispatchOutcome::Abandoned => {
                    self.stats.record_abandoned();
                }
            }

            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Process ActivityTask"
            );
            self.stats.task_finished();
            drop(permit);
        }
        .instrument(span)
        .await
    }

    async fn respond_completed(&self, report: CompletionReport) {
        if let Err(err) = self.service.respond_activity_task_completed(report.into()).await {
            self.stats.record_response_error();
            error!(error = %err, "RespondActivityTaskCompleted error");
        }
    }

    async fn respond_failed(&self, task: &ActivityTask, err: &ActivityError) {
        let report = match FailureReport::new(task.task_token.clone(), self.identity.clone(), err) {
            Ok(report) => report,
            Err(e) => {
                self.stats.record_response_error();
                error!(error = %e, "failed to encode failure details");
                return;
            }
        };
        if let Err(err) = self.service.respond_activity_task_failed(report.into()).await {
            self.stats.record_response_error();
            error!(error = %err, "RespondActivityTaskFailed error");
        }
    }
}
