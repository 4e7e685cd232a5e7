// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// LinkisClient: shared handle on the transport plus the execute façade.

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::credentials::{resolve_credentials, Credentials};
use crate::error::{LinkisError, Result};
use crate::models::{ExecuteOutcome, ExecutionHandle, JobResult, JobState, Task, TaskStatus};
use crate::poller::PollOptions;
use crate::retry::with_retry;
use crate::submission::ExecuteRequest;
use crate::transport::{ApiRequest, HttpTransport, Transport};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

// =============================================================================
// Client
// =============================================================================

/// Client for one gateway. Cheap to clone; clones share the session.
#[derive(Debug, Clone)]
pub struct LinkisClient {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
    user: String,
}

impl LinkisClient {
    /// HTTP client for the given credentials with default configuration.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::builder().credentials(credentials).build()
    }

    /// HTTP client with credentials resolved from the environment or
    /// `accounts.csv`.
    pub fn from_env() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> LinkisClientBuilder {
        LinkisClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// User jobs are submitted as.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Send one request, retrying transient failures.
    pub(crate) fn call(&self, what: &str, request: &ApiRequest) -> Result<Value> {
        with_retry(&self.config.retry, self.clock(), what, || {
            self.transport.send(request)
        })
    }

    /// Establish the gateway session up front. Requests log in lazily
    /// otherwise.
    pub fn login(&self) -> Result<()> {
        self.transport.login()
    }

    pub fn logout(&self) -> Result<()> {
        self.transport.logout()
    }

    /// Blocking options pinned to this client's configuration.
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions::default().poll(self.config.poll_options())
    }

    // =========================================================================
    // Execute Façade
    // =========================================================================

    /// Submit a job and, unless `options.wait` is false, drive it to a
    /// terminal state and fetch its results.
    ///
    /// Results are fetched only when the job succeeded. A job that failed
    /// remotely is returned as `Finished` with `status == Failed`.
    ///
    /// # Errors
    /// Submission errors are returned as is. Anything failing after
    /// submission is wrapped in `LinkisError::Job` carrying the ids; use
    /// `LinkisError::root` to inspect the cause.
    pub fn execute<F>(
        &self,
        request: &ExecuteRequest,
        options: &ExecuteOptions,
        mut on_update: F,
    ) -> Result<ExecuteOutcome>
    where
        F: FnMut(&Task),
    {
        let handle = self.submit(request)?;
        tracing::debug!(%handle, state = ?JobState::Submitted, "job state");

        if !options.wait {
            return Ok(ExecuteOutcome::Submitted(handle));
        }

        let poll = options.poll_options(&self.config);
        self.complete(&handle, &poll, &mut on_update, None)
            .map(|result| ExecuteOutcome::Finished(Box::new(result)))
            .map_err(|e| e.with_job(&handle.exec_id, &handle.task_id))
    }

    /// Blocking execute with the client's defaults and no progress callback.
    pub fn run(&self, request: &ExecuteRequest) -> Result<JobResult> {
        let handle = self.submit(request)?;
        self.wait_and_fetch(&handle, &self.config.poll_options(), |_| {})
    }

    /// Poll an already submitted job to completion and fetch its results.
    pub fn wait_and_fetch<F>(
        &self,
        handle: &ExecutionHandle,
        poll: &PollOptions,
        mut on_update: F,
    ) -> Result<JobResult>
    where
        F: FnMut(&Task),
    {
        self.complete(handle, poll, &mut on_update, None)
            .map_err(|e| e.with_job(&handle.exec_id, &handle.task_id))
    }

    /// Poll and fetch on a worker thread. The returned job can be cancelled,
    /// which stops polling and skips the fetch; the remote job is untouched.
    pub fn spawn_completion<F>(
        &self,
        handle: ExecutionHandle,
        poll: PollOptions,
        mut on_update: F,
    ) -> BackgroundJob
    where
        F: FnMut(&Task) + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let client = self.clone();
        let worker_handle = handle.clone();
        let worker_cancel = Arc::clone(&cancel);

        let worker = thread::spawn(move || {
            client
                .complete(&worker_handle, &poll, &mut on_update, Some(worker_cancel.as_ref()))
                .map_err(|e| e.with_job(&worker_handle.exec_id, &worker_handle.task_id))
        });

        BackgroundJob {
            handle,
            cancel,
            worker,
        }
    }

    fn complete(
        &self,
        handle: &ExecutionHandle,
        poll: &PollOptions,
        on_update: &mut dyn FnMut(&Task),
        cancel: Option<&AtomicBool>,
    ) -> Result<JobResult> {
        tracing::debug!(%handle, state = ?JobState::Polling, "job state");
        let task = self.poll_until_terminal(handle, poll, on_update, cancel)?;
        let state = JobState::from(task.status);
        tracing::debug!(%handle, ?state, "job state");

        let table = if task.status == TaskStatus::Succeed {
            if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                return Err(LinkisError::Cancelled);
            }
            Some(self.fetch_results(&task)?)
        } else {
            if let Some(desc) = &task.error_desc {
                tracing::info!(%handle, status = %task.status, error = %desc, "job did not succeed");
            }
            None
        };

        Ok(JobResult {
            handle: handle.clone(),
            state,
            status: task.status,
            task,
            table,
        })
    }
}

// =============================================================================
// Execute Options
// =============================================================================

/// Controls `LinkisClient::execute`. Unset fields fall back to the
/// executing client's `ClientConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOptions {
    /// Block until the job is terminal (default) or return right after submission
    pub wait: bool,
    /// Replaces the client's poll settings
    pub poll: Option<PollOptions>,
    /// Replaces only the wall-clock budget
    pub timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            wait: true,
            poll: None,
            timeout: None,
        }
    }
}

impl ExecuteOptions {
    pub fn no_wait(mut self) -> Self {
        self.wait = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll(mut self, poll: PollOptions) -> Self {
        self.poll = Some(poll);
        self
    }

    /// Effective poll settings against `config`.
    pub fn poll_options(&self, config: &ClientConfig) -> PollOptions {
        let mut poll = self.poll.clone().unwrap_or_else(|| config.poll_options());
        if let Some(timeout) = self.timeout {
            poll.timeout = timeout;
        }
        poll
    }
}

// =============================================================================
// Background Completion
// =============================================================================

/// A job being polled on a worker thread.
#[derive(Debug)]
pub struct BackgroundJob {
    handle: ExecutionHandle,
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<Result<JobResult>>,
}

impl BackgroundJob {
    pub fn handle(&self) -> &ExecutionHandle {
        &self.handle
    }

    /// Stop polling before the next status query. Takes effect within one
    /// poll interval.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker. Cancelled jobs yield `LinkisError::Cancelled`
    /// (annotated with the job ids).
    pub fn join(self) -> Result<JobResult> {
        match self.worker.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for `LinkisClient`.
#[derive(Debug, Default)]
pub struct LinkisClientBuilder {
    credentials: Option<Credentials>,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    config: ClientConfig,
    user: Option<String>,
}

impl LinkisClientBuilder {
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Use a custom transport instead of HTTP.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Submitting user; defaults to the credentials' user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.config.job_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self.config.max_poll_interval = self.config.max_poll_interval.max(interval);
        self
    }

    pub fn build(self) -> Result<LinkisClient> {
        let credentials = match (self.credentials, &self.transport) {
            (Some(credentials), _) => Some(credentials),
            (None, None) => Some(resolve_credentials(None, None, None)?),
            (None, Some(_)) => None,
        };

        let user = self
            .user
            .or_else(|| credentials.as_ref().map(|c| c.username().to_string()))
            .ok_or(LinkisError::NoCredentials)?;

        let transport: Arc<dyn Transport> = match (self.transport, credentials) {
            (Some(transport), _) => transport,
            (None, Some(credentials)) => Arc::new(HttpTransport::with_timeout(
                credentials,
                self.config.request_timeout,
            )?),
            (None, None) => return Err(LinkisError::NoCredentials),
        };

        Ok(LinkisClient {
            transport,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
            user,
        })
    }
}
