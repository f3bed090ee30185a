//! Line-delimited JSON-RPC channel between the backend and the tool server.

pub mod client;
pub mod error_code;
pub mod protocol;
pub mod server;

pub use client::ToolClient;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use server::{MessageProcessor, serve};
