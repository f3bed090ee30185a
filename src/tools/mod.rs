//! Tool registry and the prescription tool set.

pub mod envelope;
pub mod prescription_tools;
pub mod registry;
pub mod schema;

pub use envelope::{CallToolResult, ContentBlock, ToolOutput, canonical_json};
pub use prescription_tools::PrescriptionTools;
pub use registry::{
    CallPhase, ToolDefinition, ToolDescriptor, ToolFuture, ToolHandler, ToolRegistry,
};
pub use schema::{ParamSpec, ParamType, ToolArgs, ToolSchema};
