//! Domain model (IDs, tasks, reports, errors).
//!
//! transport にも runtime にも依存しない「形」だけを定義する。

pub mod errors;
pub mod ids;
pub mod report;
pub mod task;

pub use self::errors::{ActivityError, ErrorKind};
pub use self::ids::{DispatchId, WorkerId};
pub use self::report::{CompletionReport, FAILURE_REASON, FailureDetails, FailureReport};
pub use self::task::{ActivityTask, ActivityType, TaskToken, WorkflowExecution};
