// PUBLIC DOMAIN - NO LICENSE, NO WARRANTY
//
// Apache Linkis CLI
//
// Binary entry point for the CLI.
//
// Usage:
//     linkis execute 'SHOW TABLES'            # Run inline SQL and print the rows
//     linkis execute -f etl.py                # Run a script, run type from extension
//     linkis status EXEC_ID                   # Query job status
//     linkis kill EXEC_ID                     # Kill a running job

fn main() {
    std::process::exit(linkis::cli_main());
}
