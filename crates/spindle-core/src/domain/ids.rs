//! Domain identifiers (strongly-typed IDs).
//!
//! ワーカーとディスパッチ（1 タスク分の実行）を識別する ULID ベースの ID。
//! ログの相関に使うだけで、サービス側には送らない。
//!
//! ## Phantom Type パターン
//! `Id<T>` で共通実装を持ち、`T` はコンパイル時だけ意味を持つマーカー型。
//! `WorkerId` と `DispatchId` は混同できない。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"worker-", "dispatch-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Worker のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl IdMarker for Worker {
    fn prefix() -> &'static str {
        "worker-"
    }
}

/// Dispatch のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dispatch {}

impl IdMarker for Dispatch {
    fn prefix() -> &'static str {
        "dispatch-"
    }
}

/// Identifier of one started worker (one task loop).
pub type WorkerId = Id<Worker>;

/// Identifier of one dispatch of an activity task to its handler.
pub type DispatchId = Id<Dispatch>;
