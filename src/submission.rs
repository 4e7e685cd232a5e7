// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Job submission: POST /entrance/submit
//
// Request body:
//     {
//       "executionContent": {"code": "...", "runType": "sql"},
//       "params": {
//         "variable": {"yesterday": "20241028"},
//         "configuration": {"runtime": {...}, "startup": {...}}
//       },
//       "source": {"scriptPath": "file:///tmp/my_script.sql"},
//       "labels": {"engineType": "spark-2.4.3", "userCreator": "hadoop-IDE"}
//     }
//
// Response data: {"execID": "...", "taskID": 123}

use crate::client::LinkisClient;
use crate::config::{DEFAULT_ENGINE_TYPE, DEFAULT_RUN_TYPE};
use crate::error::{LinkisError, Result};
use crate::models::{id_field, ExecutionHandle, Settings};
use crate::transport::ApiRequest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Script extension to gateway run type
fn get_run_type_map() -> HashMap<&'static str, &'static str> {
    [
        ("sql", "sql"),
        ("hql", "hql"),
        ("py", "py"),
        ("python", "python"),
        ("scala", "scala"),
        ("sh", "shell"),
        ("shell", "shell"),
        ("jdbc", "jdbc"),
        ("r", "r"),
        ("out", "pipeline"),
    ]
    .into_iter()
    .collect()
}

/// Detect the run type from a script's file name.
///
/// # Examples
/// ```
/// use linkis::submission::detect_run_type;
///
/// assert_eq!(detect_run_type("daily_report.sql"), Some("sql"));
/// assert_eq!(detect_run_type("etl.py"), Some("py"));
/// assert_eq!(detect_run_type("Job.scala"), Some("scala"));
/// assert_eq!(detect_run_type("Makefile"), None);
/// ```
pub fn detect_run_type(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit('.').next()?;
    if ext == filename {
        return None;
    }
    get_run_type_map().get(ext.to_lowercase().as_str()).copied()
}

/// Engine tuning forwarded verbatim to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    /// Applied per execution, e.g. `spark.sql.shuffle.partitions`
    pub runtime: Settings,
    /// Applied when an engine is started, e.g. `spark.executor.memory`
    pub startup: Settings,
}

impl EngineConfiguration {
    pub fn is_empty(&self) -> bool {
        self.runtime.is_empty() && self.startup.is_empty()
    }
}

/// The `params` block of a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionParams {
    /// `${name}` substitutions applied to the code by the gateway
    pub variable: Settings,
    pub configuration: EngineConfiguration,
}

impl ExecutionParams {
    /// Parse a nested `{"variable": .., "configuration": {"runtime": .., "startup": ..}}`
    /// value; unknown top-level keys are ignored.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Everything needed to submit one job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub code: String,
    pub run_type: String,
    /// Engine and version selector, e.g. `spark-2.4.3`
    pub engine_type: String,
    pub params: ExecutionParams,
    /// Alternate script origin; the gateway treats it as the job's content source
    pub script_path: Option<String>,
    /// Extra labels sent alongside `engineType` and `userCreator`
    pub labels: Settings,
}

impl ExecuteRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            run_type: DEFAULT_RUN_TYPE.to_string(),
            engine_type: DEFAULT_ENGINE_TYPE.to_string(),
            params: ExecutionParams::default(),
            script_path: None,
            labels: Settings::new(),
        }
    }

    pub fn run_type(mut self, run_type: impl Into<String>) -> Self {
        self.run_type = run_type.into();
        self
    }

    pub fn engine_type(mut self, engine_type: impl Into<String>) -> Self {
        self.engine_type = engine_type.into();
        self
    }

    pub fn params(mut self, params: ExecutionParams) -> Self {
        self.params = params;
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.variable.insert(name.into(), value.into());
        self
    }

    pub fn runtime(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.configuration.runtime.insert(key.into(), value.into());
        self
    }

    pub fn startup(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.configuration.startup.insert(key.into(), value.into());
        self
    }

    pub fn script_path(mut self, path: impl Into<String>) -> Self {
        self.script_path = Some(path.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(LinkisError::Submission("code must not be empty".into()));
        }
        if self.run_type.trim().is_empty() {
            return Err(LinkisError::Submission("runType must not be empty".into()));
        }
        if self.engine_type.trim().is_empty() {
            return Err(LinkisError::Submission("engineType must not be empty".into()));
        }
        Ok(())
    }

    /// Wire body for `/entrance/submit`.
    pub fn to_body(&self, user: &str, creator: &str) -> Value {
        let mut labels = serde_json::Map::new();
        for (key, value) in &self.labels {
            labels.insert(key.clone(), value.clone());
        }
        labels.insert("engineType".into(), json!(self.engine_type));
        labels.insert("userCreator".into(), json!(format!("{user}-{creator}")));

        let mut body = json!({
            "executionContent": {
                "code": self.code,
                "runType": self.run_type,
            },
            "params": {
                "variable": self.params.variable,
                "configuration": {
                    "runtime": self.params.configuration.runtime,
                    "startup": self.params.configuration.startup,
                },
            },
            "labels": labels,
        });
        if let Some(path) = &self.script_path {
            body["source"] = json!({ "scriptPath": path });
        }
        body
    }
}

impl LinkisClient {
    /// Submit a job and return its handle.
    ///
    /// Not idempotent: every call creates a distinct job on the gateway.
    ///
    /// # Errors
    /// `Submission` when the request is invalid, the gateway rejects it, or
    /// the response lacks `execID`/`taskID`. Transport failures that outlast
    /// the retry budget surface as `Http`.
    pub fn submit(&self, request: &ExecuteRequest) -> Result<ExecutionHandle> {
        request.validate()?;
        let body = request.to_body(self.user(), &self.config().creator);

        let data = self
            .call("submit", &ApiRequest::post("/entrance/submit", body))
            .map_err(|e| match e {
                LinkisError::Api { status, message } => LinkisError::Submission(format!(
                    "gateway rejected job (status {status}): {message}"
                )),
                LinkisError::NotFound(what) => {
                    LinkisError::Submission(format!("gateway rejected job: {what}"))
                }
                other => other,
            })?;

        let exec_id = id_field(&data, "execID")
            .ok_or_else(|| LinkisError::Submission("response lacks execID".into()))?;
        let task_id = id_field(&data, "taskID")
            .ok_or_else(|| LinkisError::Submission("response lacks taskID".into()))?;

        let handle = ExecutionHandle::new(exec_id, task_id);
        tracing::info!(
            exec_id = %handle.exec_id,
            task_id = %handle.task_id,
            engine = %request.engine_type,
            run_type = %request.run_type,
            "job submitted"
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_run_type() {
        assert_eq!(detect_run_type("report.SQL"), Some("sql"));
        assert_eq!(detect_run_type("etl.hql"), Some("hql"));
        assert_eq!(detect_run_type("init.sh"), Some("shell"));
        assert_eq!(detect_run_type("/tmp/dir.v2/noext"), None);
        assert_eq!(detect_run_type("notes.txt"), None);
    }

    #[test]
    fn test_body_shape() {
        let request = ExecuteRequest::new("SELECT * FROM t WHERE ds = ${yesterday}")
            .variable("yesterday", "20241028")
            .runtime("spark.sql.shuffle.partitions", "200")
            .startup("spark.executor.instances", 4)
            .script_path("file:///tmp/my_script.sql");

        let body = request.to_body("hadoop", "IDE");
        assert_eq!(body["executionContent"]["runType"], "sql");
        assert_eq!(body["params"]["variable"]["yesterday"], "20241028");
        assert_eq!(
            body["params"]["configuration"]["runtime"]["spark.sql.shuffle.partitions"],
            "200"
        );
        assert_eq!(
            body["params"]["configuration"]["startup"]["spark.executor.instances"],
            4
        );
        assert_eq!(body["source"]["scriptPath"], "file:///tmp/my_script.sql");
        assert_eq!(body["labels"]["engineType"], "spark-2.4.3");
        assert_eq!(body["labels"]["userCreator"], "hadoop-IDE");
    }

    #[test]
    fn test_body_without_source() {
        let body = ExecuteRequest::new("SHOW TABLES").to_body("u", "c");
        assert!(body.get("source").is_none());
        assert_eq!(body["params"]["variable"], json!({}));
    }

    #[test]
    fn test_label_cannot_override_engine() {
        let body = ExecuteRequest::new("1")
            .engine_type("hive-2.3.3")
            .label("engineType", "spark-3.0.0")
            .label("executeOnce", "true")
            .to_body("u", "c");
        assert_eq!(body["labels"]["engineType"], "hive-2.3.3");
        assert_eq!(body["labels"]["executeOnce"], "true");
    }

    #[test]
    fn test_params_from_nested_value() {
        let params = ExecutionParams::from_value(json!({
            "configuration": {
                "runtime": {"spark.sql.adaptive.enabled": "true"},
                "startup": {"spark.executor.memory": "4g"}
            },
            "other": 1
        }))
        .unwrap();
        assert!(params.variable.is_empty());
        assert_eq!(params.configuration.startup["spark.executor.memory"], "4g");
        assert!(!params.configuration.is_empty());
    }

    #[test]
    fn test_validate_rejects_blank_code() {
        let err = ExecuteRequest::new("   ").validate().unwrap_err();
        assert!(matches!(err, LinkisError::Submission(_)));
        assert!(ExecuteRequest::new("SHOW TABLES").validate().is_ok());
    }
}
