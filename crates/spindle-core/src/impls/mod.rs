//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryService**: long poll 付きのインメモリ WorkflowService
//!
//! # 本番用実装
//! Thrift / gRPC のクライアントは別クレートで `WorkflowService` を実装します。

pub mod inmem_service;

pub use self::inmem_service::InMemoryService;
