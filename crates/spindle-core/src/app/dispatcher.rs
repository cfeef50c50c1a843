//! Dispatcher - 1 タスクを handler に渡して結果を決める
//!
//! # 流れ
//! 1. activity_type で handler を引く（なければ policy に従う）
//! 2. input を位置引数にデコードし、個数を handler の arity と照合
//! 3. 別 task で invoke（panic を JoinError として受け取るため）
//! 4. 期限切れ / shutdown ではトークンを cancel し、grace 後に abort
//!
//! 返すのは `DispatchOutcome` だけで、サービスへの応答は呼び出し側の仕事。

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::config::{UnknownActivityPolicy, WorkerConfig};
use crate::domain::{ActivityError, ActivityTask};
use crate::ports::IdGenerator;
use crate::typed::{ActivityContext, ActivityRegistry, CodecError, PayloadCodec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    /// JSON-encoded return value.
    Completed(Vec<u8>),
    Failed(ActivityError),
    /// No handler; nothing is reported.
    Abandoned,
}

pub(crate) struct Dispatcher {
    registry: Arc<ActivityRegistry>,
    identity: String,
    activity_timeout: Option<Duration>,
    cancellation_grace: Duration,
    unknown_policy: UnknownActivityPolicy,
    ids: Arc<dyn IdGenerator>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<ActivityRegistry>,
        config: &WorkerConfig,
        identity: impl Into<String>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            registry,
            identity: identity.into(),
            activity_timeout: config.activity_timeout,
            cancellation_grace: config.cancellation_grace,
            unknown_policy: config.unknown_activity_policy,
            ids,
        }
    }

    /// Shorter of the configured timeout and the task's start-to-close timeout.
    fn time_limit(&self, task: &ActivityTask) -> Option<Duration> {
        match (self.activity_timeout, task.start_to_close_timeout) {
            (Some(configured), Some(scheduled)) => Some(configured.min(scheduled)),
            (configured, scheduled) => configured.or(scheduled),
        }
    }

    pub(crate) async fn dispatch(
        &self,
        task: &ActivityTask,
        shutdown: &CancellationToken,
    ) -> DispatchOutcome {
        let Some(activity) = self.registry.get(&task.activity_type) else {
            error!(
                activity_type = %task.activity_type,
                task_token = %task.task_token,
                policy = ?self.unknown_policy,
                "activity type not found"
            );
            return match self.unknown_policy {
                UnknownActivityPolicy::Abandon => DispatchOutcome::Abandoned,
                UnknownActivityPolicy::Fail => DispatchOutcome::Failed(ActivityError::new(
                    ActivityError::NOT_REGISTERED,
                    format!("no activity registered for {}", task.activity_type),
                )),
            };
        };

        let decoded = PayloadCodec::decode_args(&task.input).and_then(|args| {
            if args.len() == activity.arity() {
                Ok(args)
            } else {
                Err(CodecError::Arity {
                    expected: activity.arity(),
                    actual: args.len(),
                })
            }
        });
        let args = match decoded {
            Ok(args) => args,
            Err(e) => {
                return DispatchOutcome::Failed(ActivityError::new(
                    ActivityError::DECODE,
                    e.to_string(),
                ));
            }
        };

        let limit = self.time_limit(task);
        let cancellation = shutdown.child_token();
        let ctx = ActivityContext::new(
            self.ids.generate_dispatch_id(),
            task,
            self.identity.clone(),
            limit.map(|l| Instant::now() + l),
            cancellation.clone(),
        );

        let mut handle = tokio::spawn(async move { activity.invoke(ctx, args).await });

        let expired = async {
            match limit {
                Some(l) => {
                    tokio::time::sleep(l).await;
                    l
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            joined = &mut handle => outcome_of(joined),
            limit = expired => {
                cancellation.cancel();
                // Past the deadline the outcome is a timeout, even when the
                // activity still returns within the grace period.
                self.wind_down(task, handle).await;
                DispatchOutcome::Failed(ActivityError::timeout(limit))
            }
            _ = cancellation.cancelled() => match self.wind_down(task, handle).await {
                Some(joined) => outcome_of(joined),
                None => DispatchOutcome::Failed(ActivityError::new(
                    ActivityError::CANCELLED,
                    "worker shut down before the activity finished",
                )),
            },
        }
    }

    /// Give a cancelled activity `cancellation_grace` to return, then abort it.
    async fn wind_down(
        &self,
        task: &ActivityTask,
        mut handle: JoinHandle<Result<Value, ActivityError>>,
    ) -> Option<Result<Result<Value, ActivityError>, JoinError>> {
        match tokio::time::timeout(self.cancellation_grace, &mut handle).await {
            Ok(joined) => Some(joined),
            Err(_) => {
                warn!(
                    activity_type = %task.activity_type,
                    grace_ms = self.cancellation_grace.as_millis() as u64,
                    "activity ignored cancellation, aborting"
                );
                handle.abort();
                None
            }
        }
    }
}

fn outcome_of(joined: Result<Result<Value, ActivityError>, JoinError>) -> DispatchOutcome {
    match joined {
        Ok(Ok(value)) => match PayloadCodec::encode_result(&value) {
            Ok(bytes) => DispatchOutcome::Completed(bytes),
            Err(e) => DispatchOutcome::Failed(ActivityError::new(ActivityError::ENCODE, e.to_string())),
        },
        Ok(Err(err)) => DispatchOutcome::Failed(err),
        Err(join_err) if join_err.is_panic() => {
            DispatchOutcome::Failed(ActivityError::panic(panic_message(join_err.into_panic())))
        }
        Err(join_err) => DispatchOutcome::Failed(ActivityError::new(
            ActivityError::CANCELLED,
            join_err.to_string(),
        )),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "activity panicked".to_string()
    }
}
