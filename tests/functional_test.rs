// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY

//! Linkis Rust SDK - Functional Tests
//!
//! Tests library functions against a real gateway.
//! Requires: LINKIS_ADDRESS, LINKIS_USERNAME, LINKIS_PASSWORD
//! Optional: LINKIS_ENGINE (default spark-2.4.3)
//!
//! Usage:
//!   cargo test --test functional_test -- --nocapture

use linkis::*;
use std::env;
use std::time::Duration;

fn get_creds() -> Option<Credentials> {
    let address = env::var("LINKIS_ADDRESS").ok()?;
    let username = env::var("LINKIS_USERNAME").ok()?;
    let password = env::var("LINKIS_PASSWORD").ok()?;
    if address.is_empty() || username.is_empty() || password.is_empty() {
        return None;
    }
    Some(Credentials::password(address, username, password))
}

fn engine() -> String {
    env::var("LINKIS_ENGINE").unwrap_or_else(|_| "spark-2.4.3".to_string())
}

macro_rules! skip_no_creds {
    () => {
        match get_creds() {
            Some(c) => c,
            None => {
                eprintln!("SKIP: LINKIS_ADDRESS, LINKIS_USERNAME and LINKIS_PASSWORD required");
                return;
            }
        }
    };
}

#[test]
fn functional_login_logout() {
    let creds = skip_no_creds!();
    let client = LinkisClient::new(creds).expect("client should build");
    client.login().expect("login should succeed");
    client.logout().expect("logout should succeed");
}

#[test]
fn functional_execute_show_tables() {
    let creds = skip_no_creds!();
    let client = LinkisClient::new(creds).expect("client should build");

    let request = ExecuteRequest::new("SHOW TABLES").engine_type(engine());
    let options = ExecuteOptions::default().timeout(Duration::from_secs(600));
    let outcome = client
        .execute(&request, &options, |task| {
            eprintln!("status={} progress={:.2}", task.status, task.progress)
        })
        .expect("execute should succeed");

    let result = outcome.into_result().expect("blocking execute returns a result");
    assert!(
        result.succeeded(),
        "job should succeed, got {} ({:?})",
        result.status,
        result.task.error_desc
    );
    let table = result.table.expect("succeeded job has a table");
    eprintln!("SHOW TABLES returned {} rows", table.len());
}

#[test]
fn functional_variables_are_substituted() {
    let creds = skip_no_creds!();
    let client = LinkisClient::new(creds).expect("client should build");

    let request = ExecuteRequest::new("SELECT '${day}' AS day")
        .engine_type(engine())
        .variable("day", "20241028");
    let result = client.run(&request).expect("run should succeed");

    assert!(result.succeeded());
    let table = result.table.expect("table");
    assert_eq!(table.records()[0]["day"], "20241028");
}

#[test]
fn functional_submit_kill_info() {
    let creds = skip_no_creds!();
    let client = LinkisClient::new(creds).expect("client should build");

    let request = ExecuteRequest::new("SELECT count(*) FROM range(100000000000)")
        .engine_type(engine());
    let handle = client.submit(&request).expect("submit should succeed");
    eprintln!("submitted {handle}");

    let ack = client.kill(&handle.exec_id).expect("kill should succeed");
    assert!(ack.success, "kill should be acknowledged: {:?}", ack.message);

    let task = client
        .wait_for_terminal(
            &handle,
            &PollOptions::fixed(Duration::from_secs(120), Duration::from_secs(2)),
            |_| {},
        )
        .expect("job should settle after kill");
    assert!(task.is_terminal());

    let info = client.get_info(&handle.task_id).expect("get_info should succeed");
    assert_eq!(info.task_id, handle.task_id);
    assert!(info.status.is_terminal());

    // Killing a finished job is a no-op.
    assert!(client.kill(&handle.exec_id).expect("second kill").success);
}

#[test]
fn functional_unknown_task() {
    let creds = skip_no_creds!();
    let client = LinkisClient::new(creds).expect("client should build");

    let err = client.get_info("0").expect_err("task 0 should not exist");
    assert!(matches!(err.root(), LinkisError::NotFound(_)), "got {err:?}");
}
