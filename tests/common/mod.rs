// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// In-memory gateway and manual clock shared by the integration tests.

#![allow(dead_code)]

use linkis::{
    decode_response, ApiRequest, ClientConfig, Clock, LinkisClient, LinkisError, Method, Result,
    RetryConfig, TaskStatus, Transport,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

// ============================================================================
// Manual Clock
// ============================================================================

/// Clock that only moves when something sleeps on it.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}

// ============================================================================
// Fake Gateway
// ============================================================================

/// One job as the fake gateway sees it.
#[derive(Debug, Clone)]
pub struct FakeJob {
    pub exec_id: String,
    pub task_id: String,
    /// Answers to successive status queries; the last one repeats
    pub statuses: VecDeque<TaskStatus>,
    pub progress: f64,
    pub logs: Vec<String>,
    pub result_location: Option<String>,
    pub error_desc: Option<String>,
    pub status_queries: usize,
}

impl FakeJob {
    pub fn new(exec_id: &str, task_id: &str, statuses: &[TaskStatus]) -> Self {
        Self {
            exec_id: exec_id.to_string(),
            task_id: task_id.to_string(),
            statuses: statuses.iter().copied().collect(),
            progress: 0.5,
            logs: Vec::new(),
            result_location: None,
            error_desc: None,
            status_queries: 0,
        }
    }

    pub fn results_at(mut self, location: &str) -> Self {
        self.result_location = Some(location.to_string());
        self
    }

    pub fn logs(mut self, lines: &[&str]) -> Self {
        self.logs = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn error(mut self, desc: &str) -> Self {
        self.error_desc = Some(desc.to_string());
        self
    }

    fn current(&self) -> TaskStatus {
        self.statuses.front().copied().unwrap_or(TaskStatus::Inited)
    }

    fn advance(&mut self) -> TaskStatus {
        self.status_queries += 1;
        if self.statuses.len() > 1 {
            self.statuses.pop_front().unwrap_or(TaskStatus::Inited)
        } else {
            self.current()
        }
    }
}

#[derive(Debug, Clone)]
struct FakeFile {
    metadata: Value,
    rows: Vec<Value>,
}

#[derive(Debug)]
struct Fault {
    path_contains: String,
    remaining: usize,
    status: i32,
}

#[derive(Debug, Default)]
struct GatewayState {
    jobs: HashMap<String, FakeJob>,
    queued: VecDeque<FakeJob>,
    files: HashMap<String, FakeFile>,
    faults: Vec<Fault>,
    requests: Vec<ApiRequest>,
    submissions: Vec<Value>,
    next_id: u64,
    envelope_errors: bool,
}

/// Scriptable in-memory stand-in for the gateway's REST API.
#[derive(Debug, Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Gateway that answers the way a live one does: missing files and
    /// unknown ids come back as a rejected envelope ("... does not exist")
    /// with HTTP 200, and every answer goes through `decode_response`.
    pub fn with_envelope_errors() -> Arc<Self> {
        let gateway = Self::default();
        gateway.state().envelope_errors = true;
        Arc::new(gateway)
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap()
    }

    /// Register a job that can be polled directly.
    pub fn add_job(&self, job: FakeJob) {
        self.state().jobs.insert(job.exec_id.clone(), job);
    }

    /// Job handed out by the next submit call.
    pub fn queue_job(&self, job: FakeJob) {
        self.state().queued.push_back(job);
    }

    /// Table result set at `path` (e.g. `hdfs:///r/1/_0.dolphin`).
    pub fn add_table(&self, path: &str, columns: &[(&str, &str)], rows: Vec<Value>) {
        let metadata = columns
            .iter()
            .map(|(name, data_type)| {
                json!({"columnName": name, "dataType": data_type, "comment": ""})
            })
            .collect();
        self.state().files.insert(
            path.to_string(),
            FakeFile {
                metadata: Value::Array(metadata),
                rows,
            },
        );
    }

    /// Text result set at `path`.
    pub fn add_text(&self, path: &str, lines: &[&str]) {
        self.state().files.insert(
            path.to_string(),
            FakeFile {
                metadata: json!("NULL"),
                rows: lines.iter().map(|l| json!([l])).collect(),
            },
        );
    }

    /// Fail the next `times` requests whose path contains `path_contains`
    /// with an envelope error of the given status.
    pub fn fail_next(&self, path_contains: &str, times: usize, status: i32) {
        self.state().faults.push(Fault {
            path_contains: path_contains.to_string(),
            remaining: times,
            status,
        });
    }

    pub fn job(&self, exec_id: &str) -> Option<FakeJob> {
        self.state().jobs.get(exec_id).cloned()
    }

    pub fn status_queries(&self, exec_id: &str) -> usize {
        self.job(exec_id).map_or(0, |job| job.status_queries)
    }

    /// Requests seen so far whose path ends with `suffix`.
    pub fn count(&self, suffix: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.path.ends_with(suffix))
            .count()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state().requests.clone()
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.state().submissions.clone()
    }

    fn take_fault(state: &mut GatewayState, path: &str) -> Option<LinkisError> {
        let fault = state
            .faults
            .iter_mut()
            .find(|f| f.remaining > 0 && path.contains(&f.path_contains))?;
        fault.remaining -= 1;
        Some(LinkisError::Api {
            status: fault.status,
            message: format!("injected failure on {path}"),
        })
    }

    fn submit(state: &mut GatewayState, body: Value) -> Result<Value> {
        state.submissions.push(body);
        state.next_id += 1;
        let job = state.queued.pop_front().unwrap_or_else(|| {
            let id = state.next_id;
            FakeJob::new(
                &format!("exec_{id}"),
                &format!("{id}"),
                &[TaskStatus::Succeed],
            )
        });
        let data = json!({
            "execID": job.exec_id,
            "taskID": job.task_id.parse::<u64>().map_or(json!(job.task_id), |n| json!(n)),
        });
        state.jobs.insert(job.exec_id.clone(), job);
        Ok(data)
    }

    fn entrance(state: &mut GatewayState, request: &ApiRequest) -> Result<Value> {
        let mut parts = request.path.trim_start_matches("/entrance/").splitn(2, '/');
        let exec_id = parts.next().unwrap_or_default().to_string();
        let action = parts.next().unwrap_or_default();

        let Some(job) = state.jobs.get_mut(&exec_id) else {
            return Err(LinkisError::NotFound(request.path.clone()));
        };

        match action {
            "status" => Ok(json!({"execID": exec_id, "status": job.advance().as_str()})),
            "progress" => Ok(json!({"execID": exec_id, "progress": job.progress})),
            "log" => {
                let from: usize = request
                    .param("fromLine")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                let size: usize = request
                    .param("size")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100);
                let lines: Vec<&str> = job
                    .logs
                    .iter()
                    .skip(from)
                    .take(size)
                    .map(String::as_str)
                    .collect();
                let next = from + lines.len();
                Ok(json!({
                    "execID": exec_id,
                    "log": ["", "", "", lines.join("\n")],
                    "fromLine": next,
                }))
            }
            "kill" => {
                if job.current().is_terminal() {
                    Err(LinkisError::Api {
                        status: 1,
                        message: format!("job {exec_id} is already completed"),
                    })
                } else {
                    job.statuses = VecDeque::from([TaskStatus::Cancelled]);
                    Ok(json!({"execID": exec_id}))
                }
            }
            _ => Err(LinkisError::NotFound(request.path.clone())),
        }
    }

    fn history(state: &GatewayState, request: &ApiRequest) -> Result<Value> {
        let task_id = request
            .path
            .trim_start_matches("/jobhistory/")
            .trim_end_matches("/get");
        let Some(job) = state.jobs.values().find(|j| j.task_id == task_id) else {
            return Ok(json!({"task": null}));
        };
        let status = job.current();
        let err_code = if status == TaskStatus::Failed { 10001 } else { 0 };
        Ok(json!({
            "task": {
                "taskID": job.task_id.parse::<u64>().map_or(json!(job.task_id), |n| json!(n)),
                "execId": job.exec_id,
                "strongExecId": job.exec_id,
                "status": status.as_str(),
                "progress": job.progress,
                "errCode": err_code,
                "errDesc": job.error_desc.clone().unwrap_or_default(),
                "resultLocation": job.result_location,
                "engineType": "spark",
                "createdTime": 1_730_073_600_000i64,
                "updatedTime": 1_730_073_660_000i64,
            }
        }))
    }

    fn dir_file_trees(state: &GatewayState, request: &ApiRequest) -> Result<Value> {
        let dir = request.param("path").unwrap_or_default().trim_end_matches('/');
        let prefix = format!("{dir}/");
        let children: Vec<Value> = state
            .files
            .keys()
            .filter_map(|path| {
                let name = path.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| {
                    json!({"name": name, "path": path, "isLeaf": true, "parentPath": dir})
                })
            })
            .collect();
        if children.is_empty() {
            return Err(LinkisError::NotFound(format!("/filesystem/getDirFileTrees {dir}")));
        }
        Ok(json!({
            "dirFileTrees": {
                "name": dir.rsplit('/').next().unwrap_or(dir),
                "path": dir,
                "isLeaf": false,
                "children": children,
            }
        }))
    }

    fn open_file(state: &GatewayState, request: &ApiRequest) -> Result<Value> {
        let path = request.param("path").unwrap_or_default();
        let Some(file) = state.files.get(path) else {
            return Err(LinkisError::NotFound(format!("/filesystem/openFile {path}")));
        };
        let page: usize = request
            .param("page")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        let page_size: usize = request
            .param("pageSize")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);
        let rows: Vec<Value> = file
            .rows
            .iter()
            .skip((page.max(1) - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();
        Ok(json!({
            "metadata": file.metadata,
            "fileContent": rows,
            "type": "2",
            "totalLine": file.rows.len(),
        }))
    }
}

/// Wire body a live gateway would send for `answer`.
fn envelope_body(path: &str, answer: &Result<Value>) -> String {
    let method = format!("/api/rest_j/v1{path}");
    let envelope = match answer {
        Ok(data) => json!({"method": method, "status": 0, "message": "OK", "data": data}),
        Err(LinkisError::NotFound(what)) => json!({
            "method": method,
            "status": 1,
            "message": format!("{what} does not exist"),
        }),
        Err(LinkisError::Api { status, message }) => {
            json!({"method": method, "status": status, "message": message})
        }
        Err(LinkisError::Unauthorized(message)) => {
            json!({"method": method, "status": -1, "message": message})
        }
        Err(other) => json!({"method": method, "status": 1, "message": other.to_string()}),
    };
    envelope.to_string()
}

impl Transport for FakeGateway {
    fn send(&self, request: &ApiRequest) -> Result<Value> {
        let mut state = self.state();
        let answer = Self::route(&mut state, request);
        if state.envelope_errors {
            decode_response(200, &request.path, &envelope_body(&request.path, &answer))
        } else {
            answer
        }
    }
}

impl FakeGateway {
    fn route(state: &mut GatewayState, request: &ApiRequest) -> Result<Value> {
        state.requests.push(request.clone());

        if let Some(fault) = Self::take_fault(state, &request.path) {
            return Err(fault);
        }

        match (request.method, request.path.as_str()) {
            (Method::Post, "/entrance/submit") => {
                Self::submit(state, request.body.clone().unwrap_or(Value::Null))
            }
            (Method::Get, path) if path.starts_with("/entrance/") => {
                Self::entrance(state, request)
            }
            (Method::Get, path) if path.starts_with("/jobhistory/") => {
                Self::history(state, request)
            }
            (Method::Get, "/filesystem/getDirFileTrees") => Self::dir_file_trees(state, request),
            (Method::Get, "/filesystem/openFile") => Self::open_file(state, request),
            _ => Err(LinkisError::NotFound(request.path.clone())),
        }
    }
}

// ============================================================================
// Client Helpers
// ============================================================================

/// Retries without jitter so tests see fixed delays.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        retry: RetryConfig::default().without_jitter(),
        ..ClientConfig::default()
    }
}

pub fn client_with(
    gateway: &Arc<FakeGateway>,
    clock: &Arc<ManualClock>,
    config: ClientConfig,
) -> LinkisClient {
    LinkisClient::builder()
        .transport(gateway.clone())
        .clock(clock.clone())
        .config(config)
        .user("hadoop")
        .build()
        .unwrap()
}

pub fn client(gateway: &Arc<FakeGateway>, clock: &Arc<ManualClock>) -> LinkisClient {
    client_with(gateway, clock, test_config())
}

/// `n` rows of `[id, "row-id"]` starting at `first`.
pub fn rows(first: i64, n: i64) -> Vec<Value> {
    (first..first + n)
        .map(|id| json!([id, format!("row-{id}")]))
        .collect()
}
