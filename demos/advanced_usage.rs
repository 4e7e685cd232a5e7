// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Advanced usage of the Linkis Rust SDK
//
// Variables, engine configuration, script sources, background completion
// and error inspection.
//
// To run:
//     cargo run --example advanced_usage -- http://localhost:9001 hadoop secret spark-2.4.3

use linkis::{
    ClientConfig, Credentials, ExecuteOptions, ExecuteRequest, ExecutionParams, LinkisClient,
    LinkisError, PollOptions, ResultTable, TaskStatus,
};
use serde_json::json;
use std::env;
use std::time::Duration;

fn run_example(client: &LinkisClient, request: &ExecuteRequest) -> Option<ResultTable> {
    tracing::info!(code = %request.code, "executing");

    // Poll cadence comes from the client's config; only the budget is set here.
    let options = ExecuteOptions::default().timeout(Duration::from_secs(1800));
    let outcome = client.execute(request, &options, |task| {
        tracing::info!(status = %task.status, progress = task.progress, "task update");
    });

    match outcome.map(|o| o.into_result()) {
        Ok(Some(result)) if result.status == TaskStatus::Succeed => {
            let table = result.table.unwrap_or_else(ResultTable::empty);
            tracing::info!(
                rows = table.len(),
                columns = ?table.column_names(),
                "execution completed"
            );
            for record in table.records().iter().take(5) {
                tracing::info!(?record, "row");
            }
            Some(table)
        }
        Ok(Some(result)) => {
            tracing::error!(
                status = %result.status,
                error = result.task.error_desc.as_deref().unwrap_or(""),
                "execution did not succeed"
            );
            None
        }
        Ok(None) => None,
        Err(e) => {
            match e.root() {
                LinkisError::Timeout { seconds, .. } => {
                    tracing::error!(seconds, "timed out; the job keeps running remotely")
                }
                LinkisError::Api { status, message } => {
                    tracing::error!(status, %message, "gateway error")
                }
                other => tracing::error!(error = %other, "client error"),
            }
            None
        }
    }
}

fn main() -> Result<(), LinkisError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let arg = |i: usize, env_key: &str, default: &str| {
        args.get(i)
            .cloned()
            .or_else(|| env::var(env_key).ok())
            .unwrap_or_else(|| default.to_string())
    };
    let credentials = Credentials::password(
        arg(0, "LINKIS_ADDRESS", "http://localhost:9001"),
        arg(1, "LINKIS_USERNAME", "admin"),
        arg(2, "LINKIS_PASSWORD", "admin"),
    );
    let engine = arg(3, "LINKIS_ENGINE", "spark-2.4.3");

    let config = ClientConfig {
        poll_interval: Duration::from_secs(2),
        max_poll_interval: Duration::from_secs(10),
        poll_multiplier: 1.5,
        ..ClientConfig::default()
    };
    let client = LinkisClient::builder()
        .credentials(credentials)
        .config(config)
        .build()?;
    client.login()?;

    // Example 1: code variables
    tracing::info!("=== Example 1: SQL query with variables ===");
    let request = ExecuteRequest::new("SELECT * FROM default.my_table WHERE ds = ${yesterday}")
        .engine_type(&engine)
        .variable("yesterday", "20241028");
    run_example(&client, &request);

    // Example 2: engine configuration from a nested params document
    tracing::info!("=== Example 2: Query with engine configuration ===");
    let params = ExecutionParams::from_value(json!({
        "configuration": {
            "runtime": {
                "spark.sql.shuffle.partitions": "200",
                "spark.sql.adaptive.enabled": "true"
            },
            "startup": {
                "spark.executor.instances": "4",
                "spark.executor.cores": "2",
                "spark.executor.memory": "4g"
            }
        }
    }))?;
    let request = ExecuteRequest::new("SELECT * FROM large_table LIMIT 100")
        .engine_type(&engine)
        .params(params);
    run_example(&client, &request);

    // Example 3: script source
    tracing::info!("=== Example 3: Executing from a script file ===");
    let request = ExecuteRequest::new("source /tmp/my_script.sql")
        .engine_type(&engine)
        .script_path("file:///tmp/my_script.sql");
    run_example(&client, &request);

    // Example 4: poll on a worker thread with a short budget, then cancel
    tracing::info!("=== Example 4: Background completion ===");
    let handle = client.submit(
        &ExecuteRequest::new("SELECT count(*) FROM large_table").engine_type(&engine),
    )?;
    let job = client.spawn_completion(
        handle,
        PollOptions::fixed(Duration::from_secs(600), Duration::from_secs(1)),
        |task| tracing::info!(status = %task.status, "background update"),
    );
    std::thread::sleep(Duration::from_secs(3));
    if !job.is_finished() {
        job.cancel();
        client.kill(&job.handle().exec_id)?;
    }
    match job.join() {
        Ok(result) => tracing::info!(status = %result.status, "background job finished"),
        Err(e) if matches!(e.root(), LinkisError::Cancelled) => {
            tracing::info!("background polling cancelled")
        }
        Err(e) => return Err(e),
    }

    client.logout()
}
