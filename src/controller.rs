// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Kill and info lookups on live or finished jobs.

use crate::client::LinkisClient;
use crate::error::{LinkisError, Result};
use crate::models::{KillAck, RawTask, Task};
use crate::transport::ApiRequest;
use serde_json::Value;

impl LinkisClient {
    /// Ask the gateway to kill an execution.
    ///
    /// Safe on any job: killing one that already finished is a successful
    /// no-op. This does not stop a local poll loop.
    ///
    /// # Errors
    /// `NotFound` when the gateway does not know `exec_id`.
    pub fn kill(&self, exec_id: &str) -> Result<KillAck> {
        let path = format!("/entrance/{exec_id}/kill");
        match self.call("kill", &ApiRequest::get(path)) {
            Ok(_) => {
                tracing::info!(%exec_id, "kill requested");
                Ok(KillAck {
                    success: true,
                    message: None,
                })
            }
            Err(LinkisError::Api { status, message }) if status < 500 => {
                // The entrance refuses to kill finished jobs; that still counts.
                let current = self.query_status(exec_id)?;
                if current.is_terminal() {
                    tracing::debug!(%exec_id, status = %current, "kill on finished job");
                    Ok(KillAck {
                        success: true,
                        message: Some(format!("job already {current}")),
                    })
                } else {
                    tracing::warn!(%exec_id, %message, "kill rejected");
                    Ok(KillAck {
                        success: false,
                        message: Some(message),
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Point-in-time job history record for `task_id`. Does not poll.
    ///
    /// # Errors
    /// `NotFound` when the gateway has no record of `task_id`.
    pub fn get_info(&self, task_id: &str) -> Result<Task> {
        let path = format!("/jobhistory/{task_id}/get");
        let data = self.call("info", &ApiRequest::get(path))?;
        match data.get("task") {
            Some(record @ Value::Object(_)) => {
                let raw: RawTask = serde_json::from_value(record.clone())?;
                raw.into_task()
            }
            _ => Err(LinkisError::NotFound(format!("task {task_id}"))),
        }
    }
}
