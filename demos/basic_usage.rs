// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Basic usage of the Linkis Rust SDK
//
// Runs a query to completion, then submits a second job without waiting
// and kills it.
//
// To run:
//     export LINKIS_ADDRESS="http://localhost:9001"
//     export LINKIS_USERNAME="hadoop"
//     export LINKIS_PASSWORD="secret"
//     cargo run --example basic_usage

use linkis::{ExecuteOptions, ExecuteOutcome, ExecuteRequest, LinkisClient, LinkisError, Task};
use std::io;
use std::thread;
use std::time::Duration;

fn print_task_status(task: &Task) {
    println!("Task status: {}, Progress: {:.2}", task.status, task.progress);
}

fn main() -> Result<(), LinkisError> {
    let client = LinkisClient::from_env()?;

    println!("Logging in...");
    client.login()?;
    println!("Login successful!");

    // Example 1: submit and wait
    println!("\n=== Example 1: Execute SQL query ===");
    let request = ExecuteRequest::new("SHOW TABLES").engine_type("spark-2.4.3");
    println!("Executing: {}", request.code);

    let outcome = client.execute(&request, &client.execute_options(), print_task_status)?;
    if let Some(result) = outcome.into_result() {
        if result.succeeded() {
            println!("SQL execution completed successfully!");
            if let Some(table) = &result.table {
                println!("\n{} rows:", table.len());
                table.write_tsv(io::stdout().lock())?;
            }
        } else {
            println!("SQL execution failed with status: {}", result.status);
            if let Some(desc) = &result.task.error_desc {
                println!("Error: {desc}");
            }
        }
    }

    // Example 2: submit without waiting, then kill
    println!("\n=== Example 2: Submit and kill a job ===");
    let long_query = ExecuteRequest::new(
        "SELECT t1.* FROM (SELECT * FROM my_big_table WHERE some_column > 1000) t1 \
         JOIN another_big_table t2 ON t1.id = t2.id",
    );
    let outcome = client.execute(&long_query, &ExecuteOptions::default().no_wait(), |_| {})?;
    let handle = match outcome {
        ExecuteOutcome::Submitted(handle) => handle,
        ExecuteOutcome::Finished(result) => result.handle,
    };
    println!("Job submitted: {handle}");

    thread::sleep(Duration::from_secs(5));
    let ack = client.kill(&handle.exec_id)?;
    println!("Kill result: success={} message={:?}", ack.success, ack.message);

    thread::sleep(Duration::from_secs(2));
    let task = client.get_info(&handle.task_id)?;
    println!("Final job status: {}", task.status);

    client.logout()?;
    Ok(())
}
