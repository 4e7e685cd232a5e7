// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// `linkis` command-line front end.
//
// Usage:
//     linkis execute 'SHOW TABLES'                       Run and print the result table
//     linkis execute -f report.sql --var ds=20241028     Run a script file with variables
//     linkis execute --no-wait 'SELECT ...'              Submit only, print the ids
//     linkis status EXEC_ID                              Current status
//     linkis info TASK_ID                                Job history record
//     linkis kill EXEC_ID                                Kill a job
//     linkis result TASK_ID                              Print the result table
//     linkis log EXEC_ID                                 Print execution log

use crate::client::{ExecuteOptions, LinkisClient};
use crate::config::ClientConfig;
use crate::credentials::resolve_credentials;
use crate::error::{LinkisError, Result};
use crate::models::{ExecuteOutcome, Task};
use crate::poller::PollOptions;
use crate::submission::{detect_run_type, ExecuteRequest};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// =============================================================================
// Exit Codes
// =============================================================================

/// Success
pub const EXIT_SUCCESS: i32 = 0;
/// General error, or the job did not succeed
pub const EXIT_ERROR: i32 = 1;
/// Invalid arguments
pub const EXIT_INVALID_ARGS: i32 = 2;
/// Missing or rejected credentials
pub const EXIT_AUTH_ERROR: i32 = 3;
/// Gateway rejected the request
pub const EXIT_API_ERROR: i32 = 4;
/// Poll budget exhausted
pub const EXIT_TIMEOUT: i32 = 5;

// =============================================================================
// Arguments
// =============================================================================

/// Submit and monitor jobs on an Apache Linkis gateway
#[derive(Parser, Debug)]
#[command(name = "linkis", version, about, long_about = None)]
pub struct Cli {
    /// Gateway address (default: $LINKIS_ADDRESS or http://localhost:9001)
    #[arg(short = 'a', long, global = true)]
    pub address: Option<String>,

    /// Login user (default: $LINKIS_USERNAME or accounts.csv)
    #[arg(short = 'u', long, global = true)]
    pub username: Option<String>,

    /// Login password (default: $LINKIS_PASSWORD or accounts.csv)
    #[arg(short = 'p', long, global = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a job, wait for it and print its results
    Execute(ExecuteArgs),
    /// Print the current status of an execution
    Status { exec_id: String },
    /// Print the job history record of a task
    Info { task_id: String },
    /// Kill an execution
    Kill { exec_id: String },
    /// Print the result table of a succeeded task
    Result { task_id: String },
    /// Print execution log lines
    Log {
        exec_id: String,
        /// First line to read
        #[arg(long, default_value_t = 0)]
        from_line: u64,
        #[arg(long, default_value_t = 1000)]
        size: u32,
    },
}

#[derive(Args, Debug)]
pub struct ExecuteArgs {
    /// Inline code to run
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub code: Option<String>,

    /// Read code from a script file
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Run type: sql, hql, py, scala, shell, ... (default: from file extension or sql)
    #[arg(short = 'r', long)]
    pub run_type: Option<String>,

    /// Engine and version, e.g. spark-2.4.3 or hive-2.3.3
    #[arg(short = 'e', long, default_value = crate::config::DEFAULT_ENGINE_TYPE)]
    pub engine: String,

    /// Code variable NAME=VALUE (repeatable)
    #[arg(long = "var", value_parser = parse_key_value)]
    pub variables: Vec<(String, String)>,

    /// Runtime engine setting KEY=VALUE (repeatable)
    #[arg(long, value_parser = parse_key_value)]
    pub runtime: Vec<(String, String)>,

    /// Startup engine setting KEY=VALUE (repeatable)
    #[arg(long, value_parser = parse_key_value)]
    pub startup: Vec<(String, String)>,

    /// Script path sent as the job's source
    #[arg(long)]
    pub script_path: Option<String>,

    /// Return right after submission
    #[arg(long)]
    pub no_wait: bool,

    /// Seconds to wait for the job
    #[arg(short = 't', long, default_value_t = 3600)]
    pub timeout: u64,

    /// Seconds between status polls
    #[arg(short = 'i', long, default_value_t = 1)]
    pub interval: u64,

    /// Stream execution log lines while waiting
    #[arg(long)]
    pub logs: bool,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

impl ExecuteArgs {
    /// Build the submission, reading the script file if one was given.
    pub fn to_request(&self) -> Result<ExecuteRequest> {
        let (code, detected) = match (&self.code, &self.file) {
            (_, Some(file)) => {
                let name = file.to_string_lossy();
                (fs::read_to_string(file)?, detect_run_type(&name))
            }
            (Some(code), None) => (code.clone(), None),
            (None, None) => (String::new(), None),
        };

        let mut request = ExecuteRequest::new(code).engine_type(&self.engine);
        if let Some(run_type) = self.run_type.as_deref().or(detected) {
            request = request.run_type(run_type);
        }
        for (name, value) in &self.variables {
            request = request.variable(name, value.as_str());
        }
        for (key, value) in &self.runtime {
            request = request.runtime(key, value.as_str());
        }
        for (key, value) in &self.startup {
            request = request.startup(key, value.as_str());
        }
        if let Some(path) = &self.script_path {
            request = request.script_path(path);
        }
        Ok(request)
    }

    pub fn to_options(&self) -> ExecuteOptions {
        let poll = PollOptions::fixed(
            Duration::from_secs(self.timeout),
            Duration::from_secs(self.interval.max(1)),
        )
        .with_logs(self.logs);
        let options = ExecuteOptions::default().poll(poll);
        if self.no_wait {
            options.no_wait()
        } else {
            options
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

fn exit_code_for(error: &LinkisError) -> i32 {
    match error.root() {
        LinkisError::NoCredentials | LinkisError::Unauthorized(_) => EXIT_AUTH_ERROR,
        LinkisError::Api { .. } | LinkisError::Submission(_) | LinkisError::NotFound(_) => {
            EXIT_API_ERROR
        }
        LinkisError::Timeout { .. } => EXIT_TIMEOUT,
        _ => EXIT_ERROR,
    }
}

fn print_task(task: &Task) {
    println!("execID:    {}", task.exec_id);
    println!("taskID:    {}", task.task_id);
    println!("status:    {}", task.status);
    println!("progress:  {:.0}%", task.progress * 100.0);
    if let Some(engine) = &task.engine_type {
        println!("engine:    {engine}");
    }
    if let Some(location) = &task.result_location {
        println!("results:   {location}");
    }
    if let Some(desc) = &task.error_desc {
        println!("error:     {desc}");
    }
}

/// Writes only the log lines not seen by an earlier call.
#[derive(Debug, Default)]
struct LogEcho {
    printed: usize,
}

impl LogEcho {
    fn write_new<W: Write>(&mut self, logs: &[String], out: &mut W) -> io::Result<()> {
        for line in logs.iter().skip(self.printed) {
            writeln!(out, "{line}")?;
        }
        self.printed = self.printed.max(logs.len());
        Ok(())
    }
}

fn cmd_execute(client: &LinkisClient, args: &ExecuteArgs) -> Result<i32> {
    let request = args.to_request()?;
    let options = args.to_options();
    let mut echo = LogEcho::default();

    let outcome = client.execute(&request, &options, |task| {
        let _ = echo.write_new(&task.logs, &mut io::stderr().lock());
        eprintln!("[{}] {:.0}%", task.status, task.progress * 100.0);
    })?;

    match outcome {
        ExecuteOutcome::Submitted(handle) => {
            println!("execID: {}", handle.exec_id);
            println!("taskID: {}", handle.task_id);
            Ok(EXIT_SUCCESS)
        }
        ExecuteOutcome::Finished(result) => {
            // Lines from the terminal poll never reach the callback.
            echo.write_new(&result.task.logs, &mut io::stderr().lock())?;
            if let Some(table) = &result.table {
                table.write_tsv(io::stdout().lock())?;
            }
            println!("---");
            println!("Status: {}", result.status);
            if let Some(desc) = &result.task.error_desc {
                println!("Error: {desc}");
            }
            Ok(if result.succeeded() {
                EXIT_SUCCESS
            } else {
                EXIT_ERROR
            })
        }
    }
}

fn dispatch(client: &LinkisClient, command: &Command) -> Result<i32> {
    match command {
        Command::Execute(args) => cmd_execute(client, args),
        Command::Status { exec_id } => {
            println!("{}", client.query_status(exec_id)?);
            Ok(EXIT_SUCCESS)
        }
        Command::Info { task_id } => {
            print_task(&client.get_info(task_id)?);
            Ok(EXIT_SUCCESS)
        }
        Command::Kill { exec_id } => {
            let ack = client.kill(exec_id)?;
            match &ack.message {
                Some(message) => println!("success: {} ({message})", ack.success),
                None => println!("success: {}", ack.success),
            }
            Ok(if ack.success { EXIT_SUCCESS } else { EXIT_ERROR })
        }
        Command::Result { task_id } => {
            let task = client.get_info(task_id)?;
            let table = client.fetch_results(&task)?;
            table.write_tsv(io::stdout().lock())?;
            Ok(EXIT_SUCCESS)
        }
        Command::Log {
            exec_id,
            from_line,
            size,
        } => {
            let chunk = client.fetch_log(exec_id, *from_line, *size)?;
            for line in &chunk.lines {
                println!("{line}");
            }
            Ok(EXIT_SUCCESS)
        }
    }
}

/// Run the CLI with already parsed arguments.
pub fn run(cli: Cli) -> i32 {
    let result = resolve_credentials(
        cli.address.as_deref(),
        cli.username.as_deref(),
        cli.password.as_deref(),
    )
    .and_then(|credentials| {
        LinkisClient::builder()
            .credentials(credentials)
            .config(ClientConfig::default())
            .build()
    })
    .and_then(|client| dispatch(&client, &cli.command));

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code_for(&e)
        }
    }
}

/// Install the fmt subscriber; `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,linkis=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn cli_main() -> i32 {
    init_logging();
    match Cli::try_parse() {
        Ok(cli) => run(cli),
        Err(e) => {
            let code = if e.use_stderr() {
                EXIT_INVALID_ARGS
            } else {
                EXIT_SUCCESS
            };
            let _ = e.print();
            code
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("spark.executor.memory=4g").unwrap(),
            ("spark.executor.memory".to_string(), "4g".to_string())
        );
        assert_eq!(
            parse_key_value("expr=a=b").unwrap(),
            ("expr".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_parse_execute_inline() {
        let cli = Cli::try_parse_from([
            "linkis",
            "-u",
            "hadoop",
            "execute",
            "SELECT * FROM t WHERE ds = ${ds}",
            "--var",
            "ds=20241028",
            "--startup",
            "spark.executor.instances=4",
            "--no-wait",
        ])
        .unwrap();
        assert_eq!(cli.username.as_deref(), Some("hadoop"));

        let Command::Execute(args) = cli.command else {
            panic!("expected execute");
        };
        let request = args.to_request().unwrap();
        assert_eq!(request.run_type, "sql");
        assert_eq!(request.engine_type, "spark-2.4.3");
        assert_eq!(request.params.variable["ds"], "20241028");
        assert_eq!(
            request.params.configuration.startup["spark.executor.instances"],
            "4"
        );
        assert!(!args.to_options().wait);
    }

    #[test]
    fn test_parse_execute_file_detects_run_type() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("etl.py");
        fs::write(&script, "print(spark.version)").unwrap();

        let cli = Cli::try_parse_from([
            "linkis",
            "execute",
            "-f",
            script.to_str().unwrap(),
            "-t",
            "60",
        ])
        .unwrap();
        let Command::Execute(args) = cli.command else {
            panic!("expected execute");
        };
        let request = args.to_request().unwrap();
        assert_eq!(request.run_type, "py");
        assert_eq!(request.code, "print(spark.version)");

        let options = args.to_options();
        assert!(options.wait);
        assert_eq!(options.poll.unwrap().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_execute_requires_code_or_file() {
        assert!(Cli::try_parse_from(["linkis", "execute"]).is_err());
    }

    #[test]
    fn test_parse_log_defaults() {
        let cli = Cli::try_parse_from(["linkis", "log", "exec-1"]).unwrap();
        match cli.command {
            Command::Log {
                exec_id,
                from_line,
                size,
            } => {
                assert_eq!(exec_id, "exec-1");
                assert_eq!(from_line, 0);
                assert_eq!(size, 1000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_log_echo_writes_each_line_once() {
        let mut echo = LogEcho::default();
        let mut out = Vec::new();
        let mut logs = vec!["submitted".to_string(), "running stage 1".to_string()];

        echo.write_new(&logs, &mut out).unwrap();
        echo.write_new(&logs, &mut out).unwrap();
        logs.push("job finished".to_string());
        echo.write_new(&logs, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "submitted\nrunning stage 1\njob finished\n"
        );
    }

    #[test]
    fn test_log_echo_flushes_lines_from_final_record() {
        let mut echo = LogEcho::default();
        let mut progress = Vec::new();
        echo.write_new(&["stage 1 started".to_string()], &mut progress).unwrap();

        let mut tail = Vec::new();
        let final_logs = vec![
            "stage 1 started".to_string(),
            "stage 1 done".to_string(),
            "job finished".to_string(),
        ];
        echo.write_new(&final_logs, &mut tail).unwrap();
        assert_eq!(String::from_utf8(tail).unwrap(), "stage 1 done\njob finished\n");
    }

    #[test]
    fn test_exit_codes() {
        let cancelled = LinkisError::Cancelled.with_job("e", "t");
        assert_eq!(exit_code_for(&cancelled), EXIT_ERROR);
        assert_eq!(exit_code_for(&LinkisError::NoCredentials), EXIT_AUTH_ERROR);
        assert_eq!(
            exit_code_for(&LinkisError::NotFound("x".into()).with_job("e", "t")),
            EXIT_API_ERROR
        );
    }
}
