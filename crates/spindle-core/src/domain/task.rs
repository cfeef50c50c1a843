use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque correlation value identifying one dispatched task instance.
///
/// An empty token is never real work: the service returns it when a long
/// poll times out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskToken(Vec<u8>);

impl TaskToken {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<&str> for TaskToken {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                for b in &self.0 {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Qualified activity name, by convention `"<ImplementationName>::<methodName>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityType(String);

impl ActivityType {
    pub const SEPARATOR: &'static str = "::";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// `"<implementation>::<method>"`
    pub fn qualified(implementation: &str, method: &str) -> Self {
        Self(format!("{implementation}{}{method}", Self::SEPARATOR))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ActivityType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActivityType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
}

/// A unit of work received from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityTask {
    pub task_token: TaskToken,
    pub activity_id: String,
    pub activity_type: ActivityType,
    /// Encoded positional arguments (JSON array).
    pub input: Vec<u8>,
    pub attempt: i32,
    pub start_to_close_timeout: Option<Duration>,
    pub workflow_execution: Option<WorkflowExecution>,
}

impl ActivityTask {
    pub fn new(
        task_token: impl Into<TaskToken>,
        activity_type: impl Into<ActivityType>,
        input: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            task_token: task_token.into(),
            activity_id: String::new(),
            activity_type: activity_type.into(),
            input: input.into(),
            attempt: 0,
            start_to_close_timeout: None,
            workflow_execution: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_joins_implementation_and_method() {
        let t = ActivityType::qualified("Greeter", "hello");
        assert_eq!(t.as_str(), "Greeter::hello");
        assert_eq!(t, ActivityType::from("Greeter::hello"));
        assert_eq!(ActivityType::new("hello").to_string(), "hello");
    }

    #[test]
    fn token_display_falls_back_to_hex() {
        assert_eq!(TaskToken::from("tok-1").to_string(), "tok-1");
        assert_eq!(TaskToken::new(vec![0xff, 0x01]).to_string(), "ff01");
        assert!(TaskToken::default().is_empty());
    }
}
