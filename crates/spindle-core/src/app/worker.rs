//! Worker - 設定・registry・サービスを束ねて TaskLoop を起動する
//!
//! `start(self)` は Worker を消費するので、同じ Worker を 2 回起動する
//! ことは型の上でできない。起動後の操作は `WorkerHandle` から行う。

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use super::builder::WorkerBuilder;
use super::config::WorkerConfig;
use super::dispatcher::Dispatcher;
use super::stats::{WorkerStats, WorkerStatsSnapshot};
use super::task_loop::TaskLoop;
use crate::domain::WorkerId;
use crate::ports::{
    IdGenerator, PollForActivityTaskRequest, ServiceError, TaskList, TaskListKind,
    TaskListMetadata, WorkflowService,
};
use crate::typed::ActivityRegistry;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("poll failed with a terminal service error: {0}")]
    Terminal(#[source] ServiceError),

    #[error("task loop panicked: {0}")]
    Panicked(String),

    #[error("task loop was aborted")]
    Aborted,
}

pub struct Worker {
    config: WorkerConfig,
    registry: Arc<ActivityRegistry>,
    service: Arc<dyn WorkflowService>,
    identity: String,
    worker_id: WorkerId,
    ids: Arc<dyn IdGenerator>,
}

impl Worker {
    pub fn builder(config: WorkerConfig) -> WorkerBuilder {
        WorkerBuilder::new(config)
    }

    pub(crate) fn new(
        config: WorkerConfig,
        registry: Arc<ActivityRegistry>,
        service: Arc<dyn WorkflowService>,
        identity: String,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            config,
            registry,
            service,
            identity,
            worker_id: ids.generate_worker_id(),
            ids,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ActivityRegistry {
        &self.registry
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    fn poll_request(&self) -> PollForActivityTaskRequest {
        PollForActivityTaskRequest {
            domain: self.config.domain.clone(),
            task_list: Some(TaskList {
                name: self.config.task_list.clone(),
                kind: Some(TaskListKind::Normal),
            }),
            identity: self.identity.clone(),
            task_list_metadata: Some(TaskListMetadata {
                max_tasks_per_second: Some(self.config.max_tasks_per_second),
            }),
        }
    }

    /// Spawn the task loop on the current tokio runtime.
    ///
    /// # Panics
    /// Outside a tokio runtime.
    pub fn start(self) -> WorkerHandle {
        let shutdown = CancellationToken::new();
        let stats = Arc::new(WorkerStats::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.registry),
            &self.config,
            self.identity.clone(),
            Arc::clone(&self.ids),
        );
        let task_loop = TaskLoop {
            service: Arc::clone(&self.service),
            dispatcher: Arc::new(dispatcher),
            request: self.poll_request(),
            backoff: self.config.poll_backoff.clone(),
            permits: Arc::new(Semaphore::new(self.config.max_concurrent_activities)),
            stats: Arc::clone(&stats),
            shutdown: shutdown.clone(),
        };

        info!(
            worker_id = %self.worker_id,
            identity = %self.identity,
            domain = %self.config.domain,
            task_list = %self.config.task_list,
            activities = self.registry.len(),
            max_concurrent_activities = self.config.max_concurrent_activities,
            "activity worker started"
        );

        let span = info_span!("worker", worker_id = %self.worker_id);
        let worker_id = self.worker_id;
        let join = tokio::spawn(
            async move {
                let result = task_loop.run().await;
                info!(ok = result.is_ok(), "activity worker stopped");
                result
            }
            .instrument(span),
        );

        WorkerHandle {
            worker_id,
            shutdown,
            stats,
            join,
        }
    }
}

/// Handle of a started worker.
/// - `request_shutdown()` で poll を止め、実行中の activity に cancel を伝える
/// - `join()` でループの終了（in-flight の応答送信まで）を待てる
/// - handle を drop してもループは止まらない
pub struct WorkerHandle {
    worker_id: WorkerId,
    shutdown: CancellationToken,
    stats: Arc<WorkerStats>,
    join: JoinHandle<Result<(), WorkerError>>,
}

impl WorkerHandle {
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait for the loop to end on its own (terminal error or shutdown).
    pub async fn join(self) -> Result<(), WorkerError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(WorkerError::Panicked(e.to_string())),
            Err(_) => Err(WorkerError::Aborted),
        }
    }

    pub async fn shutdown_and_join(self) -> Result<(), WorkerError> {
        self.request_shutdown();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{PollBackoff, UnknownActivityPolicy};
    use crate::domain::{ActivityError, FailureDetails};
    use crate::impls::InMemoryService;
    use crate::telemetry::tests::LogCapture;
    use crate::typed::ActivityContext;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> WorkerConfig {
        let mut config = WorkerConfig::new("localhost", 7933, "samples", "greetings");
        config.poll_backoff = PollBackoff::fixed(Duration::from_millis(5));
        config
    }

    fn service() -> Arc<InMemoryService> {
        Arc::new(InMemoryService::with_poll_timeout(Duration::from_millis(20)).with_identity("42@test"))
    }

    fn greeter(config: WorkerConfig, service: &Arc<InMemoryService>) -> WorkerBuilder {
        Worker::builder(config)
            .service(service.clone())
            .register_fn("Greeter::hello", |_ctx, (name,): (String,)| async move {
                if name.is_empty() {
                    return Err(ActivityError::new("ValueError", "bad name"));
                }
                Ok(format!("Hello {name}"))
            })
    }

    async fn eventually(handle: &WorkerHandle, done: impl Fn(&WorkerStatsSnapshot) -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !done(&handle.stats()) {
            assert!(tokio::time::Instant::now() < deadline, "timed out: {:?}", handle.stats());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    fn details(req: &crate::ports::RespondActivityTaskFailedRequest) -> FailureDetails {
        serde_json::from_slice(req.details.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn hello_world_is_completed() {
        let service = service();
        service.enqueue("tok-1", "Greeter::hello", br#"["World"]"#.to_vec()).await;
        let handle = greeter(config(), &service).build().unwrap().start();

        assert!(service.wait_for_responses(1, WAIT).await);
        handle.shutdown_and_join().await.unwrap();

        let completed = service.completed().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].task_token, b"tok-1".to_vec());
        assert_eq!(completed[0].result.as_deref(), Some(&br#""Hello World""#[..]));
        assert_eq!(completed[0].identity, "42@test");
        assert!(service.failed().await.is_empty());
    }

    #[tokio::test]
    async fn handler_error_is_reported_as_failure() {
        let service = service();
        service.enqueue("tok-1", "Greeter::hello", br#"[""]"#.to_vec()).await;
        let handle = greeter(config(), &service).build().unwrap().start();

        assert!(service.wait_for_responses(1, WAIT).await);
        handle.shutdown_and_join().await.unwrap();

        let failed = service.failed().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].task_token, b"tok-1".to_vec());
        assert_eq!(failed[0].reason.as_deref(), Some("java.lang.Exception"));
        let details = details(&failed[0]);
        assert!(details.detail_message.contains("ValueError"));
        assert!(details.detail_message.contains("bad name"));
        assert_eq!(details.class, "java.lang.Exception");
        assert!(service.completed().await.is_empty());
    }

    #[tokio::test]
    async fn empty_polls_dispatch_nothing() {
        let service = service();
        let handle = greeter(config(), &service).build().unwrap().start();

        assert!(service.wait_for_polls(3, WAIT).await);
        handle.shutdown_and_join().await.unwrap();

        assert!(service.completed().await.is_empty());
        assert!(service.failed().await.is_empty());
    }

    #[tokio::test]
    async fn poll_request_carries_worker_settings() {
        let service = service();
        let handle = greeter(config(), &service).build().unwrap().start();
        assert!(service.wait_for_polls(1, WAIT).await);
        handle.shutdown_and_join().await.unwrap();

        let req = &service.poll_requests().await[0];
        assert_eq!(req.domain, "samples");
        assert_eq!(req.identity, "42@test");
        let task_list = req.task_list.as_ref().unwrap();
        assert_eq!(task_list.name, "greetings");
        assert_eq!(task_list.kind, Some(TaskListKind::Normal));
        assert_eq!(
            req.task_list_metadata.as_ref().unwrap().max_tasks_per_second,
            Some(200_000.0)
        );
    }

    #[tokio::test]
    async fn unknown_activity_is_abandoned_with_one_error_log() {
        let (logs, _guard) = LogCapture::install();
        let service = service();
        service.enqueue("tok-1", "Nope::nothing", b"[]".to_vec()).await;
        let handle = greeter(config(), &service).build().unwrap().start();

        eventually(&handle, |s| s.abandoned == 1).await;
        assert!(service.wait_for_polls(3, WAIT).await);
        handle.shutdown_and_join().await.unwrap();

        assert!(service.completed().await.is_empty());
        assert!(service.failed().await.is_empty());
        let errors = logs.errors();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].text.contains("Nope::nothing"));
    }

    #[tokio::test]
    async fn unknown_activity_can_be_failed() {
        let service = service();
        service.enqueue("tok-1", "Nope::nothing", b"[]".to_vec()).await;
        let mut cfg = config();
        cfg.unknown_activity_policy = UnknownActivityPolicy::Fail;
        let handle = greeter(cfg, &service).build().unwrap().start();

        assert!(service.wait_for_responses(1, WAIT).await);
        handle.shutdown_and_join().await.unwrap();

        let failed = service.failed().await;
        assert_eq!(failed.len(), 1);
        assert!(details(&failed[0]).detail_message.contains(ActivityError::NOT_REGISTERED));
    }

    #[tokio::test]
    async fn loop_survives_poll_dispatch_and_response_errors() {
        let service = service();
        service
            .fail_next_poll(crate::ports::ServiceError::Transport("connection reset".into()))
            .await;
        service
            .fail_next_response(crate::ports::ServiceError::Internal("unavailable".into()))
            .await;
        service.enqueue("tok-bad", "Greeter::hello", br#"[""]"#.to_vec()).await;
        let handle = greeter(config(), &service).build().unwrap().start();

        eventually(&handle, |s| s.response_errors == 1).await;
        service.enqueue("tok-good", "Greeter::hello", br#"["World"]"#.to_vec()).await;
        assert!(service.wait_for_responses(1, WAIT).await);

        let stats = handle.stats();
        handle.shutdown_and_join().await.unwrap();

        assert_eq!(stats.poll_errors, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.response_errors, 1);
        let completed = service.completed().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].task_token, b"tok-good".to_vec());
        assert!(service.failed().await.is_empty());
    }

    #[tokio::test]
    async fn failed_completion_response_is_logged_once_and_loop_continues() {
        let (logs, _guard) = LogCapture::install();
        let service = service();
        service
            .fail_next_response(crate::ports::ServiceError::Transport("connection reset".into()))
            .await;
        service.enqueue("tok-lost", "Greeter::hello", br#"["World"]"#.to_vec()).await;
        let handle = greeter(config(), &service).build().unwrap().start();

        eventually(&handle, |s| s.response_errors == 1).await;
        service.enqueue("tok-next", "Greeter::hello", br#"["Again"]"#.to_vec()).await;
        assert!(service.wait_for_responses(1, WAIT).await);

        let stats = handle.stats();
        handle.shutdown_and_join().await.unwrap();

        assert_eq!(stats.response_errors, 1);
        assert_eq!(stats.completed, 2);
        let errors = logs.errors();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].text.contains("RespondActivityTaskCompleted"), "{errors:?}");
        assert!(errors[0].text.contains("connection reset"), "{errors:?}");

        let completed = service.completed().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].task_token, b"tok-next".to_vec());
        assert_eq!(completed[0].result.as_deref(), Some(&br#""Hello Again""#[..]));
        assert!(service.failed().await.is_empty());
    }

    #[tokio::test]
    async fn terminal_poll_error_stops_the_loop() {
        let service = service();
        service
            .fail_next_poll(crate::ports::ServiceError::EntityNotExists("domain samples".into()))
            .await;
        let handle = greeter(config(), &service).build().unwrap().start();

        let result = tokio::time::timeout(WAIT, handle.join()).await.unwrap();
        assert!(matches!(
            result,
            Err(WorkerError::Terminal(crate::ports::ServiceError::EntityNotExists(_)))
        ));
        assert_eq!(service.poll_count().await, 1);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let service = service();
        for i in 0..6 {
            service
                .enqueue(format!("tok-{i}").as_str(), "Slow::work", b"[]".to_vec())
                .await;
        }
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut cfg = config();
        cfg.max_concurrent_activities = 2;

        let (c, p) = (Arc::clone(&current), Arc::clone(&peak));
        let handle = Worker::builder(cfg)
            .service(service.clone())
            .register_fn("Slow::work", move |_ctx, (): ()| {
                let (c, p) = (Arc::clone(&c), Arc::clone(&p));
                async move {
                    let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    c.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .build()
            .unwrap()
            .start();

        assert!(service.wait_for_responses(6, WAIT).await);
        handle.shutdown_and_join().await.unwrap();

        assert_eq!(service.completed().await.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn panic_and_timeout_become_failures() {
        let service = service();
        service.enqueue("tok-panic", "Bad::panic", b"[]".to_vec()).await;
        service.enqueue("tok-slow", "Bad::hang", b"[]".to_vec()).await;
        let mut cfg = config();
        cfg.activity_timeout = Some(Duration::from_millis(30));
        cfg.cancellation_grace = Duration::from_millis(10);

        let handle = Worker::builder(cfg)
            .service(service.clone())
            .register_fn("Bad::panic", |_ctx, (): ()| async move {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .register_fn("Bad::hang", |_ctx, (): ()| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .build()
            .unwrap()
            .start();

        assert!(service.wait_for_responses(2, WAIT).await);
        handle.shutdown_and_join().await.unwrap();

        let failed = service.failed().await;
        let by_token = |token: &[u8]| {
            failed
                .iter()
                .find(|r| r.task_token == token)
                .map(details)
                .unwrap()
                .detail_message
        };
        assert!(by_token(b"tok-panic").contains("Panic(boom)"));
        assert!(by_token(b"tok-slow").contains(ActivityError::TIMEOUT));
    }

    #[tokio::test]
    async fn closure_activity_stops_on_shutdown() {
        let service = service();
        service.enqueue("tok-1", "Slow::cooperative", b"[]".to_vec()).await;
        let mut cfg = config();
        cfg.cancellation_grace = Duration::from_secs(30);
        let handle = Worker::builder(cfg)
            .service(service.clone())
            .register_fn("Slow::cooperative", |ctx: ActivityContext, (): ()| async move {
                ctx.cancelled().await;
                Err::<(), _>(ActivityError::new(ActivityError::CANCELLED, "stopped by shutdown"))
            })
            .build()
            .unwrap()
            .start();

        eventually(&handle, |s| s.in_flight == 1).await;
        tokio::time::timeout(WAIT, handle.shutdown_and_join())
            .await
            .unwrap()
            .unwrap();

        let failed = service.failed().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(
            details(&failed[0]).detail_message,
            "Rust error: Cancelled(stopped by shutdown)"
        );
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_activity() {
        let service = service();
        service.enqueue("tok-1", "Slow::finish", b"[]".to_vec()).await;
        let handle = Worker::builder(config())
            .service(service.clone())
            .register_fn("Slow::finish", |_ctx, (): ()| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("done")
            })
            .build()
            .unwrap()
            .start();

        eventually(&handle, |s| s.in_flight == 1).await;
        assert!(!handle.is_finished());
        handle.shutdown_and_join().await.unwrap();

        let completed = service.completed().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].result.as_deref(), Some(&br#""done""#[..]));
    }
}
