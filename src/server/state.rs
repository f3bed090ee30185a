//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::clinical::engine::PrescriptionEngine;
use crate::rpc::client::ToolClient;

/// Shared application state.
pub struct AppState {
    /// Connected tool server.
    pub tools: Arc<ToolClient>,
    /// Prescription drafting over the same tool server.
    pub engine: PrescriptionEngine,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub fn new(tools: Arc<ToolClient>, engine: PrescriptionEngine) -> Arc<Self> {
        Arc::new(Self { tools, engine })
    }
}
