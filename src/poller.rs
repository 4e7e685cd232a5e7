// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Status polling until a job reaches a terminal state.
//
// Endpoints:
//     GET /entrance/{execID}/status    -> {"status": "Running", "execID": "..."}
//     GET /entrance/{execID}/progress  -> {"progress": 0.35, "progressInfo": [...]}
//     GET /entrance/{execID}/log       -> {"log": [error, warn, info, all], "fromLine": 120}
//     GET /jobhistory/{taskID}/get     -> full record once terminal

use crate::client::LinkisClient;
use crate::config::{DEFAULT_JOB_TIMEOUT, DEFAULT_LOG_PAGE_SIZE, DEFAULT_POLL_INTERVAL};
use crate::error::{LinkisError, Result};
use crate::models::{ExecutionHandle, LogChunk, Task, TaskStatus};
use crate::transport::ApiRequest;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Index of the combined stream in the gateway's `[error, warn, info, all]` log array
const ALL_LOG_INDEX: usize = 3;

/// Polling cadence and budget.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOptions {
    /// Wall-clock budget measured from the first status query
    pub timeout: Duration,
    /// Delay after the first non-terminal observation
    pub interval: Duration,
    /// Worst-case gap between two queries when backing off
    pub max_interval: Duration,
    /// Growth factor per poll; 1.0 keeps a fixed interval
    pub multiplier: f64,
    /// Refresh `Task::progress` on every non-terminal observation
    pub fetch_progress: bool,
    /// Pull new log lines into `Task::logs` while polling
    pub fetch_logs: bool,
    pub log_page_size: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::fixed(DEFAULT_JOB_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl PollOptions {
    /// Fixed-interval polling.
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            max_interval: interval,
            multiplier: 1.0,
            fetch_progress: true,
            fetch_logs: false,
            log_page_size: DEFAULT_LOG_PAGE_SIZE,
        }
    }

    /// Capped exponential backoff starting at `interval`.
    pub fn with_backoff(mut self, max_interval: Duration, multiplier: f64) -> Self {
        self.max_interval = max_interval.max(self.interval);
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_logs(mut self, enabled: bool) -> Self {
        self.fetch_logs = enabled;
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.fetch_progress = enabled;
        self
    }

    /// Delay after the `poll`-th (0-based) non-terminal observation.
    pub fn delay(&self, poll: u32) -> Duration {
        if self.multiplier <= 1.0 {
            return self.interval;
        }
        let grown = self.interval.as_secs_f64() * self.multiplier.powi(poll.min(64) as i32);
        Duration::from_secs_f64(grown.min(self.max_interval.as_secs_f64()))
    }
}

impl LinkisClient {
    /// Current status of an execution (single query, no waiting).
    pub fn query_status(&self, exec_id: &str) -> Result<TaskStatus> {
        let path = format!("/entrance/{exec_id}/status");
        let data = self.call("status", &ApiRequest::get(path))?;
        let raw = data
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| LinkisError::MissingField("status".into()))?;
        raw.parse()
    }

    /// Current progress of an execution in [0, 1].
    pub fn query_progress(&self, exec_id: &str) -> Result<f64> {
        let path = format!("/entrance/{exec_id}/progress");
        let data = self.call("progress", &ApiRequest::get(path))?;
        let progress = match data.get("progress") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };
        Ok(if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        })
    }

    /// Read execution log lines starting at `from_line`.
    pub fn fetch_log(&self, exec_id: &str, from_line: u64, size: u32) -> Result<LogChunk> {
        let request = ApiRequest::get(format!("/entrance/{exec_id}/log"))
            .query("fromLine", from_line)
            .query("size", size);
        let data = self.call("log", &request)?;

        let text = match data.get("log") {
            Some(Value::Array(streams)) => streams
                .get(ALL_LOG_INDEX)
                .or_else(|| streams.last())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        let lines: Vec<String> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        let next_line = data
            .get("fromLine")
            .and_then(Value::as_u64)
            .unwrap_or(from_line + lines.len() as u64);

        Ok(LogChunk { lines, next_line })
    }

    /// Poll until the job is terminal or the budget runs out.
    ///
    /// `on_update` runs on the calling thread for every non-terminal
    /// observation and never for the terminal one. Time spent inside the
    /// callback counts against `options.timeout` and delays the next poll.
    ///
    /// # Errors
    /// `Timeout` carrying the last observed task once `options.timeout`
    /// elapses; the remote job keeps running (see `kill`). A failed remote
    /// job is not an error: it returns with `status == Failed`.
    pub fn wait_for_terminal<F>(
        &self,
        handle: &ExecutionHandle,
        options: &PollOptions,
        mut on_update: F,
    ) -> Result<Task>
    where
        F: FnMut(&Task),
    {
        self.poll_until_terminal(handle, options, &mut on_update, None)
    }

    pub(crate) fn poll_until_terminal(
        &self,
        handle: &ExecutionHandle,
        options: &PollOptions,
        on_update: &mut dyn FnMut(&Task),
        cancel: Option<&AtomicBool>,
    ) -> Result<Task> {
        let clock = self.clock();
        let started = clock.now();
        let mut task = Task::observed(handle, TaskStatus::Inited);
        let mut next_log_line = 0u64;
        let mut polls = 0u32;

        loop {
            if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                tracing::info!(exec_id = %handle.exec_id, polls, "polling cancelled");
                return Err(LinkisError::Cancelled);
            }

            let status = self.query_status(&handle.exec_id)?;
            polls += 1;
            tracing::debug!(exec_id = %handle.exec_id, %status, polls, "polled status");

            if status.is_terminal() {
                if options.fetch_logs {
                    let chunk =
                        self.fetch_log(&handle.exec_id, next_log_line, options.log_page_size)?;
                    task.logs.extend(chunk.lines);
                }
                let finished = self.finish(handle, status, task)?;
                tracing::info!(
                    exec_id = %handle.exec_id,
                    task_id = %handle.task_id,
                    status = %finished.status,
                    polls,
                    elapsed_ms = clock.now().duration_since(started).as_millis() as u64,
                    "job reached terminal state"
                );
                return Ok(finished);
            }

            task.status = status;
            if options.fetch_progress {
                task.set_progress(self.query_progress(&handle.exec_id)?);
            }
            if options.fetch_logs {
                let chunk = self.fetch_log(&handle.exec_id, next_log_line, options.log_page_size)?;
                next_log_line = chunk.next_line;
                task.logs.extend(chunk.lines);
            }
            on_update(&task);

            let elapsed = clock.now().duration_since(started);
            if elapsed >= options.timeout {
                tracing::warn!(
                    exec_id = %handle.exec_id,
                    status = %task.status,
                    polls,
                    timeout_secs = options.timeout.as_secs(),
                    "poll budget exhausted"
                );
                return Err(LinkisError::Timeout {
                    seconds: options.timeout.as_secs(),
                    task: Box::new(task),
                });
            }

            let delay = options.delay(polls - 1).min(options.timeout - elapsed);
            clock.sleep(delay);
        }
    }

    /// Merge the job history record with what polling observed.
    fn finish(&self, handle: &ExecutionHandle, status: TaskStatus, observed: Task) -> Result<Task> {
        let mut task = match self.get_info(&handle.task_id) {
            Ok(record) => record,
            Err(LinkisError::NotFound(what)) => {
                tracing::warn!(task_id = %handle.task_id, %what, "no job history record, using polled state");
                observed.clone()
            }
            Err(e) => return Err(e),
        };

        // History can lag behind the entrance; the polled status wins.
        task.status = status;
        if task.exec_id.is_empty() {
            task.exec_id = handle.exec_id.clone();
        }
        if status == TaskStatus::Succeed {
            task.progress = 1.0;
        } else if task.progress < observed.progress {
            task.progress = observed.progress;
        }
        if status != TaskStatus::Failed {
            task.error_desc = None;
        }
        task.logs = observed.logs;
        Ok(task)
    }
}
