//! IdGenerator port - ID 生成とプロセス identity
//!
//! テスト容易性のために trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock から timestamp を取る）
//! - **process_identity()**: サービスへ送る `"<pid>@<hostname>"`

use crate::domain::ids::{DispatchId, WorkerId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はログ相関用の ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（並行実行中の dispatch から使われる）
pub trait IdGenerator: Send + Sync {
    fn generate_worker_id(&self) -> WorkerId;

    fn generate_dispatch_id(&self) -> DispatchId;
}

/// UlidGenerator は ULID ベースの ID 生成器
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_worker_id(&self) -> WorkerId {
        WorkerId::from(self.next_ulid())
    }

    fn generate_dispatch_id(&self) -> DispatchId {
        DispatchId::from(self.next_ulid())
    }
}

/// Stable identifier of this process, attached to every request.
///
/// Falls back to `localhost` when the hostname cannot be read.
pub fn process_identity() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}@{}", std::process::id(), host)
}
