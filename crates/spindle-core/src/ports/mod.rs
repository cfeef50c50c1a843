//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。外部システム（オーケストレーション
//! サービス、時刻、ID 生成）へのインターフェースを trait で切り出し、
//! テストでは差し替えられるようにします。

pub mod clock;
pub mod id_generator;
pub mod service;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator, process_identity};
pub use self::service::{
    PollForActivityTaskRequest, PollForActivityTaskResponse, RespondActivityTaskCompletedRequest,
    RespondActivityTaskFailedRequest, ServiceError, TaskList, TaskListKind, TaskListMetadata,
    WorkflowService,
};
