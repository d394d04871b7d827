//! Log sinks and container log routing.

use serde::{Deserialize, Serialize};
use stackline_common::constants::DEFAULT_LOG_RETENTION_DAYS;
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::{LogicalId, RemovalPolicy};

/// Retention periods the log service accepts, in days.
pub const RETENTION_PERIODS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// A log group receiving container output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSink {
    /// Fixed physical name; derived from the logical ID when absent.
    pub name: Option<String>,
    /// Days events are kept.
    pub retention_days: u32,
    /// Whether the sink is deleted with its stack.
    pub removal_policy: RemovalPolicy,
}

impl LogSink {
    /// A sink with default retention that is destroyed with its stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            name: None,
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
            removal_policy: RemovalPolicy::Destroy,
        }
    }

    /// Gives the sink a fixed physical name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the retention period.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Config` if `days` is not an accepted period.
    pub fn with_retention(mut self, days: u32) -> Result<Self> {
        if !RETENTION_PERIODS.contains(&days) {
            return Err(StacklineError::Config {
                message: format!("unsupported log retention period: {days} days"),
            });
        }
        self.retention_days = days;
        Ok(self)
    }

    /// Sets the removal policy.
    #[must_use]
    pub const fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a container writes its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfiguration {
    /// Logical ID of the sink in the owning stack.
    pub sink: LogicalId,
    /// Prefix of the container's log streams.
    pub stream_prefix: String,
}

impl LogConfiguration {
    /// Routes output to `sink` under `stream_prefix`.
    #[must_use]
    pub fn new(sink: LogicalId, stream_prefix: impl Into<String>) -> Self {
        Self {
            sink,
            stream_prefix: stream_prefix.into(),
        }
    }
}
