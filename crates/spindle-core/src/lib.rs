//! spindle-core
//!
//! Activity-task worker for a workflow-orchestration service: poll a task
//! list, run the registered activity, report the outcome.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, report, errors）
//! - **ports**: 抽象化レイヤー（WorkflowService, Clock, IdGenerator）
//! - **typed**: 型付き Activity API（Activity trait, ActivityRegistry, PayloadCodec）
//! - **app**: アプリケーションロジック（builder, worker, task loop, dispatcher）
//! - **impls**: 実装（InMemoryService など開発用）
//! - **telemetry**: tracing の初期化

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod telemetry;
pub mod typed;

pub use self::app::{Worker, WorkerBuilder, WorkerConfig, WorkerHandle};
pub use self::domain::{ActivityError, ActivityTask, ActivityType};
pub use self::typed::{Activity, ActivityContext, ActivityImplementation, ImplementationScope};
