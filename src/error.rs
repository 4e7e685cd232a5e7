// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Error taxonomy for the Linkis client.

use crate::models::{Column, Task, TaskStatus};

/// Error type for Linkis SDK operations
#[derive(Debug, thiserror::Error)]
pub enum LinkisError {
    /// No credentials found in any of the 4 tiers
    #[error("No credentials found. Please provide via:\n  1. Function arguments (address, username, password)\n  2. Environment variables (LINKIS_ADDRESS, LINKIS_USERNAME, LINKIS_PASSWORD or LINKIS_TOKEN)\n  3. ~/.linkis/accounts.csv\n  4. ./accounts.csv")]
    NoCredentials,

    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway returned a non-2xx response or a failed envelope
    #[error("API error (status {status}): {message}")]
    Api { status: i32, message: String },

    /// Session missing or expired and could not be renewed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Job was rejected or the submission response was malformed
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Poll budget exhausted; carries the last observed task
    #[error("Job {} did not finish within {seconds} seconds (last status: {})", .task.exec_id, .task.status)]
    Timeout { seconds: u64, task: Box<Task> },

    /// Operation invoked in the wrong lifecycle state
    #[error("Cannot {operation} while job is {status}")]
    InvalidState {
        operation: &'static str,
        status: TaskStatus,
    },

    /// Result sets of one execution disagree on their columns
    #[error("Result set {index} schema {found:?} does not match first result set {expected:?}")]
    SchemaMismatch {
        index: usize,
        expected: Vec<Column>,
        found: Vec<Column>,
    },

    /// Identifier unknown to the gateway
    #[error("Not found: {0}")]
    NotFound(String),

    /// Gateway reported a status string outside the known set
    #[error("Unrecognized task status: {0:?}")]
    UnknownStatus(String),

    /// Missing expected field in response
    #[error("Missing field in response: {0}")]
    MissingField(String),

    /// Local polling stopped by the caller
    #[error("Polling cancelled")]
    Cancelled,

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any error raised while driving a submitted job, annotated with its ids
    #[error("Job execID={exec_id} taskID={task_id}: {source}")]
    Job {
        exec_id: String,
        task_id: String,
        #[source]
        source: Box<LinkisError>,
    },
}

/// Result type for Linkis SDK operations
pub type Result<T> = std::result::Result<T, LinkisError>;

impl LinkisError {
    /// Whether the failure is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkisError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LinkisError::Api { status, .. } => *status >= 500,
            LinkisError::Job { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Strip any job annotation and return the underlying error.
    pub fn root(&self) -> &LinkisError {
        match self {
            LinkisError::Job { source, .. } => source.root(),
            other => other,
        }
    }

    /// Attach execution ids unless already annotated.
    pub fn with_job(self, exec_id: &str, task_id: &str) -> LinkisError {
        match self {
            annotated @ LinkisError::Job { .. } => annotated,
            other => LinkisError::Job {
                exec_id: exec_id.to_string(),
                task_id: task_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The last task observed before a poll timeout, if this is one.
    pub fn timed_out_task(&self) -> Option<&Task> {
        match self.root() {
            LinkisError::Timeout { task, .. } => Some(task),
            _ => None,
        }
    }
}
