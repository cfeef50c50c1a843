//! Errors - エラー型と分類
//!
//! - `ErrorKind`: 運用上の分類（リトライすべきか、止めるべきか）
//! - `ActivityError`: activity 実行の失敗。FailureReport の detailMessage になる

use std::time::Duration;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（接続断、サーバ内部エラー）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Permanent)
    }
}

/// Failure of one activity execution.
///
/// `kind` names the originating error type (e.g. `ParseIntError`,
/// `ValueError`), `message` is its text. Both end up in the failure details
/// sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}({message})")]
pub struct ActivityError {
    kind: String,
    message: String,
}

impl ActivityError {
    pub const NOT_REGISTERED: &'static str = "ActivityNotRegistered";
    pub const DECODE: &'static str = "ArgumentDecodeError";
    pub const ENCODE: &'static str = "ResultEncodeError";
    pub const TIMEOUT: &'static str = "ActivityTimeout";
    pub const PANIC: &'static str = "Panic";
    pub const CANCELLED: &'static str = "Cancelled";

    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Wrap any error, using its type name (without module path) as the kind.
    pub fn from_error<E: std::error::Error + 'static>(err: &E) -> Self {
        Self::new(short_type_name::<E>(), err.to_string())
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text placed in `detailMessage` of the failure details.
    pub fn detail_message(&self) -> String {
        format!("Rust error: {}({})", self.kind, self.message)
    }

    pub(crate) fn timeout(after: Duration) -> Self {
        Self::new(
            Self::TIMEOUT,
            format!("activity did not finish within {}ms", after.as_millis()),
        )
    }

    pub(crate) fn panic(message: impl Into<String>) -> Self {
        Self::new(Self::PANIC, message)
    }
}

impl From<String> for ActivityError {
    fn from(message: String) -> Self {
        Self::new("Error", message)
    }
}

impl From<&str> for ActivityError {
    fn from(message: &str) -> Self {
        Self::new("Error", message)
    }
}

/// `std::any::type_name` without the module path and generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
