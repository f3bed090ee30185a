//! HTTP backend binary. Spawns `prescription-mcp` and serves the REST API.
//! Run with: cargo run --bin prescription-server

use std::process::ExitCode;

use prescription_rag::startup;

fn main() -> ExitCode {
    startup::run_http_server()
}
