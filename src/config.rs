// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Client configuration and tunable defaults.

use crate::poller::PollOptions;
use crate::retry::RetryConfig;
use serde::Deserialize;
use std::time::Duration;

// =============================================================================
// Gateway Paths
// =============================================================================

/// REST prefix shared by every gateway endpoint
pub const API_PREFIX: &str = "/api/rest_j/v1";

/// Default gateway address used by the CLI and demos
pub const DEFAULT_ADDRESS: &str = "http://localhost:9001";

// =============================================================================
// Defaults
// =============================================================================

/// Per-request HTTP timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Wall-clock budget for a blocking execute
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(3600);

/// Delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Rows requested per openFile page
pub const DEFAULT_RESULT_PAGE_SIZE: u32 = 5000;

/// Log lines requested per log call
pub const DEFAULT_LOG_PAGE_SIZE: u32 = 100;

pub const DEFAULT_RUN_TYPE: &str = "sql";

pub const DEFAULT_ENGINE_TYPE: &str = "spark-2.4.3";

/// Creator half of the `userCreator` label
pub const DEFAULT_CREATOR: &str = "IDE";

/// Top-level configuration for a `LinkisClient`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout applied to each HTTP request.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Budget for a blocking `execute` or `run` unless the call overrides it.
    #[serde(with = "duration_ms")]
    pub job_timeout: Duration,
    /// First (and by default every) delay between polls.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Cap for the poll delay when `poll_multiplier` > 1.
    #[serde(with = "duration_ms")]
    pub max_poll_interval: Duration,
    pub poll_multiplier: f64,
    pub result_page_size: u32,
    pub creator: String,
    /// Pull incremental execution logs while polling.
    pub fetch_logs: bool,
    pub log_page_size: u32,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: REQUEST_TIMEOUT,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_interval: DEFAULT_POLL_INTERVAL,
            poll_multiplier: 1.0,
            result_page_size: DEFAULT_RESULT_PAGE_SIZE,
            creator: DEFAULT_CREATOR.to_string(),
            fetch_logs: false,
            log_page_size: DEFAULT_LOG_PAGE_SIZE,
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Poll settings derived from this configuration.
    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            timeout: self.job_timeout,
            interval: self.poll_interval,
            max_interval: self.max_poll_interval.max(self.poll_interval),
            multiplier: self.poll_multiplier.max(1.0),
            fetch_progress: true,
            fetch_logs: self.fetch_logs,
            log_page_size: self.log_page_size,
        }
    }
}

/// Durations in config files are plain millisecond integers.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
