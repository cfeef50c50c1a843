//! App - アプリケーション層
//!
//! このモジュールは、ports と typed を組み合わせて activity worker を実装します。
//!
//! # 主要コンポーネント
//! - **WorkerBuilder**: Worker の構築とワイヤリング（fail-fast 検証）
//! - **Worker / WorkerHandle**: 起動と停止
//! - **TaskLoop**: poll → dispatch → respond のループ
//! - **Dispatcher**: 1 タスクの実行（timeout, panic, cancel の扱い）
//! - **WorkerStats**: 観測用カウンタ

pub mod backoff;
pub mod builder;
pub mod config;
mod dispatcher;
pub mod stats;
mod task_loop;
pub mod worker;

// 主要な型を再エクスポート
pub use self::backoff::PollBackoff;
pub use self::builder::{BuildError, WorkerBuilder};
pub use self::config::{ConfigError, UnknownActivityPolicy, WorkerConfig};
pub use self::stats::{WorkerStats, WorkerStatsSnapshot};
pub use self::worker::{Worker, WorkerError, WorkerHandle};
