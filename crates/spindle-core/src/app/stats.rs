//! Stats - ワーカーの観測用カウンタ
//!
//! ループとディスパッチが並行に更新するので atomic で持ち、
//! 参照するときは `snapshot()` で値のコピーを取る。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct WorkerStats {
    polls: AtomicU64,
    empty_polls: AtomicU64,
    poll_errors: AtomicU64,
    tasks_received: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    response_errors: AtomicU64,
    in_flight: AtomicU64,
    last_poll_latency_ms: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatsSnapshot {
    pub polls: u64,
    pub empty_polls: u64,
    pub poll_errors: u64,
    pub tasks_received: u64,
    pub completed: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub response_errors: u64,
    pub in_flight: u64,
    pub last_poll_latency_ms: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_poll(&self, latency: Duration) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.last_poll_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poll_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_started(&self) {
        self.tasks_received.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_response_error(&self) {
        self.response_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
            tasks_received: self.tasks_received.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            response_errors: self.response_errors.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            last_poll_latency_ms: self.last_poll_latency_ms.load(Ordering::Relaxed),
        }
    }
}
