//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::backoff::PollBackoff;

/// What to do with a task whose activity type has no registered handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownActivityPolicy {
    /// Log and send nothing; the service times the task out and applies its
    /// own retry policy.
    #[default]
    Abandon,
    /// Report an `ActivityNotRegistered` failure immediately.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Service endpoint host.
    pub host: String,
    /// Service endpoint port.
    pub port: u16,
    pub domain: String,
    pub task_list: String,
    /// Overrides the identity reported by the service client.
    pub identity: Option<String>,
    /// Server-side dispatch rate hint sent with every poll.
    pub max_tasks_per_second: f64,
    /// Upper bound on activities executing at once.
    pub max_concurrent_activities: usize,
    /// Deadline for one activity execution. The task's own start-to-close
    /// timeout wins when it is shorter.
    pub activity_timeout: Option<Duration>,
    /// How long a cancelled activity may keep running before it is aborted.
    pub cancellation_grace: Duration,
    pub poll_backoff: PollBackoff,
    pub unknown_activity_policy: UnknownActivityPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl WorkerConfig {
    pub const DEFAULT: Self = Self {
        host: String::new(),
        port: 7933,
        domain: String::new(),
        task_list: String::new(),
        identity: None,
        max_tasks_per_second: 200_000.0,
        max_concurrent_activities: 8,
        activity_timeout: None,
        cancellation_grace: Duration::from_secs(5),
        poll_backoff: PollBackoff::DEFAULT,
        unknown_activity_policy: UnknownActivityPolicy::Abandon,
    };

    pub fn new(
        host: impl Into<String>,
        port: u16,
        domain: impl Into<String>,
        task_list: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            domain: domain.into(),
            task_list: task_list.into(),
            ..Self::DEFAULT
        }
    }

    /// Read `SPINDLE_*` environment variables on top of the defaults.
    ///
    /// `SPINDLE_DOMAIN` and `SPINDLE_TASK_LIST` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self {
            host: lookup("SPINDLE_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            domain: lookup("SPINDLE_DOMAIN").ok_or(ConfigError::MissingEnvVar("SPINDLE_DOMAIN"))?,
            task_list: lookup("SPINDLE_TASK_LIST")
                .ok_or(ConfigError::MissingEnvVar("SPINDLE_TASK_LIST"))?,
            identity: lookup("SPINDLE_IDENTITY"),
            ..Self::DEFAULT
        };
        if let Some(port) = lookup("SPINDLE_PORT") {
            config.port = parse("SPINDLE_PORT", &port)?;
        }
        if let Some(rate) = lookup("SPINDLE_MAX_TASKS_PER_SECOND") {
            config.max_tasks_per_second = parse("SPINDLE_MAX_TASKS_PER_SECOND", &rate)?;
        }
        if let Some(n) = lookup("SPINDLE_MAX_CONCURRENT_ACTIVITIES") {
            config.max_concurrent_activities = parse("SPINDLE_MAX_CONCURRENT_ACTIVITIES", &n)?;
        }
        if let Some(ms) = lookup("SPINDLE_ACTIVITY_TIMEOUT_MS") {
            let ms: u64 = parse("SPINDLE_ACTIVITY_TIMEOUT_MS", &ms)?;
            config.activity_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(policy) = lookup("SPINDLE_UNKNOWN_ACTIVITY_POLICY") {
            config.unknown_activity_policy = match policy.as_str() {
                "abandon" => UnknownActivityPolicy::Abandon,
                "fail" => UnknownActivityPolicy::Fail,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "SPINDLE_UNKNOWN_ACTIVITY_POLICY",
                        message: format!("expected `abandon` or `fail`, got `{other}`"),
                    });
                }
            };
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.is_empty() {
            return Err(ConfigError::MissingRequired("domain"));
        }
        if self.task_list.is_empty() {
            return Err(ConfigError::MissingRequired("task_list"));
        }
        if self.max_concurrent_activities == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrent_activities",
                message: "must be positive".to_string(),
            });
        }
        if self.max_concurrent_activities > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrent_activities",
                message: format!("must be at most {}", Semaphore::MAX_PERMITS),
            });
        }
        if self.max_tasks_per_second.is_nan() || self.max_tasks_per_second <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "max_tasks_per_second",
                message: "must be positive".to_string(),
            });
        }
        if self.activity_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidValue {
                key: "activity_timeout",
                message: "must be positive when set".to_string(),
            });
        }
        self.poll_backoff.validate()
    }

    /// `host:port` of the service endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        message: e.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("missing required configuration: {0}")]
    MissingRequired(&'static str),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_service_conventions() {
        let config = WorkerConfig::new("localhost", 7933, "samples", "greetings");
        assert_eq!(config.max_tasks_per_second, 200_000.0);
        assert_eq!(config.unknown_activity_policy, UnknownActivityPolicy::Abandon);
        assert_eq!(config.endpoint(), "localhost:7933");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let config = WorkerConfig::from_lookup(env(&[
            ("SPINDLE_HOST", "cadence"),
            ("SPINDLE_PORT", "7833"),
            ("SPINDLE_DOMAIN", "samples"),
            ("SPINDLE_TASK_LIST", "greetings"),
            ("SPINDLE_MAX_CONCURRENT_ACTIVITIES", "2"),
            ("SPINDLE_ACTIVITY_TIMEOUT_MS", "1500"),
            ("SPINDLE_UNKNOWN_ACTIVITY_POLICY", "fail"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint(), "cadence:7833");
        assert_eq!(config.max_concurrent_activities, 2);
        assert_eq!(config.activity_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.unknown_activity_policy, UnknownActivityPolicy::Fail);
    }

    #[test]
    fn from_lookup_requires_domain_and_task_list() {
        let err = WorkerConfig::from_lookup(env(&[("SPINDLE_TASK_LIST", "t")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("SPINDLE_DOMAIN")));
    }

    #[test]
    fn invalid_values_are_reported_with_their_key() {
        let err = WorkerConfig::from_lookup(env(&[
            ("SPINDLE_DOMAIN", "d"),
            ("SPINDLE_TASK_LIST", "t"),
            ("SPINDLE_PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "SPINDLE_PORT", .. }));

        let err = WorkerConfig::from_lookup(env(&[
            ("SPINDLE_DOMAIN", "d"),
            ("SPINDLE_TASK_LIST", "t"),
            ("SPINDLE_MAX_CONCURRENT_ACTIVITIES", &usize::MAX.to_string()),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "max_concurrent_activities", .. }
        ));

        let mut config = WorkerConfig::new("h", 1, "d", "t");
        config.max_concurrent_activities = 0;
        assert!(config.validate().is_err());
        config.max_concurrent_activities = Semaphore::MAX_PERMITS;
        assert!(config.validate().is_ok());
        config.max_concurrent_activities = Semaphore::MAX_PERMITS + 1;
        assert!(config.validate().is_err());
    }
}
