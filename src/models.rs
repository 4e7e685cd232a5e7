// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Job, status and result types exchanged with the Linkis gateway.

use crate::error::{LinkisError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

// =============================================================================
// Execution Handle
// =============================================================================

/// Identifies one submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionHandle {
    /// Gateway-assigned execution id, used for status, progress, log and kill
    pub exec_id: String,
    /// Durable job history id, survives engine restarts
    pub task_id: String,
}

impl ExecutionHandle {
    pub fn new(exec_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            exec_id: exec_id.into(),
            task_id: task_id.into(),
        }
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execID={} taskID={}", self.exec_id, self.task_id)
    }
}

// =============================================================================
// Task Status
// =============================================================================

/// Lifecycle status of a job as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Inited,
    Scheduled,
    Running,
    Succeed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Inited,
        TaskStatus::Scheduled,
        TaskStatus::Running,
        TaskStatus::Succeed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
        TaskStatus::Timeout,
    ];

    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        match self {
            TaskStatus::Succeed
            | TaskStatus::Failed
            | TaskStatus::Cancelled
            | TaskStatus::Timeout => true,
            TaskStatus::Inited | TaskStatus::Scheduled | TaskStatus::Running => false,
        }
    }

    /// Wire spelling used by the gateway.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Inited => "Inited",
            TaskStatus::Scheduled => "Scheduled",
            TaskStatus::Running => "Running",
            TaskStatus::Succeed => "Succeed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
            TaskStatus::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = LinkisError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| LinkisError::UnknownStatus(s.to_string()))
    }
}

// =============================================================================
// Task
// =============================================================================

/// Poll-observable job record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub exec_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    /// Fraction complete, always within [0, 1]
    pub progress: f64,
    /// Failure description, set only when the job failed
    pub error_desc: Option<String>,
    pub error_code: Option<i64>,
    /// Log lines collected so far, oldest first
    pub logs: Vec<String>,
    /// Directory holding the `_N.dolphin` result sets
    pub result_location: Option<String>,
    pub engine_type: Option<String>,
    /// Milliseconds since epoch
    pub created_time: Option<i64>,
    pub updated_time: Option<i64>,
}

impl Task {
    /// A fresh record for a handle whose status has just been observed.
    pub fn observed(handle: &ExecutionHandle, status: TaskStatus) -> Self {
        Self {
            exec_id: handle.exec_id.clone(),
            task_id: handle.task_id.clone(),
            status,
            progress: if status == TaskStatus::Succeed { 1.0 } else { 0.0 },
            error_desc: None,
            error_code: None,
            logs: Vec::new(),
            result_location: None,
            engine_type: None,
            created_time: None,
            updated_time: None,
        }
    }

    pub fn handle(&self) -> ExecutionHandle {
        ExecutionHandle::new(self.exec_id.clone(), self.task_id.clone())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn set_progress(&mut self, progress: f64) {
        self.progress = clamp_progress(progress);
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// Job history record as returned by `/jobhistory/{taskID}/get`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawTask {
    #[serde(rename = "taskID", deserialize_with = "string_or_number")]
    pub task_id: String,
    #[serde(default)]
    pub exec_id: Option<String>,
    #[serde(default)]
    pub strong_exec_id: Option<String>,
    pub status: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub progress: Option<f64>,
    #[serde(default)]
    pub err_code: Option<i64>,
    #[serde(default)]
    pub err_desc: Option<String>,
    #[serde(default)]
    pub result_location: Option<String>,
    #[serde(default)]
    pub engine_type: Option<String>,
    #[serde(default)]
    pub created_time: Option<i64>,
    #[serde(default)]
    pub updated_time: Option<i64>,
}

impl RawTask {
    pub(crate) fn into_task(self) -> Result<Task> {
        let status: TaskStatus = self.status.parse()?;
        let exec_id = self
            .strong_exec_id
            .filter(|s| !s.is_empty())
            .or(self.exec_id)
            .unwrap_or_default();
        let progress = match (self.progress, status) {
            (_, TaskStatus::Succeed) => 1.0,
            (Some(p), _) => clamp_progress(p),
            (None, _) => 0.0,
        };
        Ok(Task {
            exec_id,
            task_id: self.task_id,
            status,
            progress,
            error_desc: self.err_desc.filter(|s| !s.is_empty()),
            error_code: self.err_code.filter(|code| *code != 0),
            logs: Vec::new(),
            result_location: self.result_location.filter(|s| !s.is_empty()),
            engine_type: self.engine_type,
            created_time: self.created_time,
            updated_time: self.updated_time,
        })
    }
}

// =============================================================================
// Result Sets
// =============================================================================

/// Column descriptor of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub column_name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            column_name: name.into(),
            data_type: data_type.into(),
            comment: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.column_name
    }
}

/// Two schemas match when names and types line up; comments are ignored.
pub(crate) fn same_schema(a: &[Column], b: &[Column]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.column_name == y.column_name && x.data_type == y.data_type)
}

/// One result set (`_N.dolphin`) of an execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub index: usize,
    pub path: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

/// All result sets of one execution concatenated in index order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    /// Shared schema, `None` when the job produced no result sets
    pub columns: Option<Vec<Column>>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(Column::name)
            .collect()
    }

    /// Rows keyed by column name.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        let names = self.column_names();
        self.rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.to_string(), value.clone()))
                    .collect()
            })
            .collect()
    }

    /// Write a header line and one tab-separated line per row.
    pub fn write_tsv<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        if self.columns.is_some() {
            writeln!(out, "{}", self.column_names().join("\t"))?;
        }
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            writeln!(out, "{}", cells.join("\t"))?;
        }
        Ok(())
    }

    pub(crate) fn append(&mut self, set: ResultSet) {
        if self.columns.is_none() {
            self.columns = Some(set.columns);
        }
        self.rows.extend(set.rows);
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Controller Types
// =============================================================================

/// Acknowledgement of a kill request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillAck {
    pub success: bool,
    pub message: Option<String>,
}

/// A slice of the execution log starting at `from_line`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogChunk {
    pub lines: Vec<String>,
    /// Line to request next
    pub next_line: u64,
}

// =============================================================================
// Execute Façade Types
// =============================================================================

/// Where a job is in the client-side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl From<TaskStatus> for JobState {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Inited | TaskStatus::Scheduled | TaskStatus::Running => JobState::Polling,
            TaskStatus::Succeed => JobState::Succeeded,
            TaskStatus::Failed => JobState::Failed,
            TaskStatus::Cancelled => JobState::Cancelled,
            TaskStatus::Timeout => JobState::TimedOut,
        }
    }
}

/// Outcome of a job driven to a terminal state.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub handle: ExecutionHandle,
    pub state: JobState,
    pub status: TaskStatus,
    pub task: Task,
    /// Present only when the job succeeded
    pub table: Option<ResultTable>,
}

impl JobResult {
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeed
    }
}

/// Return value of `LinkisClient::execute`.
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    /// Non-blocking mode: the job was submitted and is still running
    Submitted(ExecutionHandle),
    /// Blocking mode: the job reached a terminal state
    Finished(Box<JobResult>),
}

impl ExecuteOutcome {
    pub fn handle(&self) -> &ExecutionHandle {
        match self {
            ExecuteOutcome::Submitted(handle) => handle,
            ExecuteOutcome::Finished(result) => &result.handle,
        }
    }

    pub fn into_result(self) -> Option<JobResult> {
        match self {
            ExecuteOutcome::Submitted(_) => None,
            ExecuteOutcome::Finished(result) => Some(*result),
        }
    }
}

// =============================================================================
// Lenient Deserializers
// =============================================================================

/// Gateway ids arrive as numbers or strings depending on the endpoint.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Read an id field that may be a string or a number.
pub(crate) fn id_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Key/value maps forwarded verbatim as variables and engine configuration.
pub type Settings = BTreeMap<String, Value>;
