// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Apache Linkis Rust SDK (Synchronous)
//
// Library Usage:
//     use linkis::{ExecuteRequest, LinkisClient, PollOptions};
//
//     // Connect (4-tier credential resolution, see `resolve_credentials`)
//     let client = LinkisClient::from_env()?;
//     client.login()?;
//
//     // Submit, poll to completion and fetch the result table
//     let request = ExecuteRequest::new("SELECT * FROM t WHERE ds = ${yesterday}")
//         .engine_type("spark-2.4.3")
//         .variable("yesterday", "20241028");
//     let outcome = client.execute(&request, &client.execute_options(), |task| {
//         println!("{} {:.0}%", task.status, task.progress * 100.0);
//     })?;
//
//     // Submit without waiting, then control the job directly
//     let handle = client.submit(&request)?;
//     let task = client.wait_for_terminal(&handle, &PollOptions::default(), |_| {})?;
//     let table = client.fetch_results(&task)?;
//     client.kill(&handle.exec_id)?;
//     let info = client.get_info(&handle.task_id)?;
//
// Job lifecycle:
//     Inited -> Scheduled -> Running -> {Succeed, Failed, Cancelled, Timeout}
//
//     A remote failure is a normal outcome (status Failed + error_desc);
//     errors are reserved for protocol violations, unknown ids, local
//     timeouts and transport faults.
//
// Logging:
//     The library emits `tracing` events and installs no subscriber.

pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod poller;
pub mod retry;
pub mod submission;
pub mod transport;

pub use cli::cli_main;
pub use client::{BackgroundJob, ExecuteOptions, LinkisClient, LinkisClientBuilder};
pub use clock::{Clock, SystemClock};
pub use config::ClientConfig;
pub use credentials::{resolve_credentials, Auth, Credentials};
pub use error::{LinkisError, Result};
pub use models::{
    Column, ExecuteOutcome, ExecutionHandle, JobResult, JobState, KillAck, LogChunk, ResultSet,
    ResultTable, Settings, Task, TaskStatus,
};
pub use poller::PollOptions;
pub use retry::RetryConfig;
pub use submission::{EngineConfiguration, ExecuteRequest, ExecutionParams};
pub use transport::{decode_response, ApiRequest, HttpTransport, Method, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
