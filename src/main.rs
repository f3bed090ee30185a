//! Binary entrypoint for the stdio tool server.

use std::process::ExitCode;

use prescription_rag::startup;

fn main() -> ExitCode {
    startup::run_tool_server()
}
