//! Startup helpers for the tool server and the HTTP backend.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use crate::clinical::adapters::completion::OllamaCompletion;
use crate::clinical::core::config::ClinicalConfig;
use crate::clinical::embedding::embedder::build_embedder;
use crate::clinical::engine::PrescriptionEngine;
use crate::clinical::retrieval::similar_cases::SimilarCaseRetriever;
use crate::clinical::storage::record_store::SqliteRecordStore;
use crate::rpc::client::ToolClient;
use crate::rpc::server::{MessageProcessor, serve};
use crate::server::{self, AppState};
use crate::tools::prescription_tools::PrescriptionTools;
use crate::tools::registry::ToolRegistry;

/// Install the fmt subscriber on stderr (`RUST_LOG` overrides the `info` default).
///
/// Stdout is reserved for the tool server protocol.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the stdio tool server (used by the `prescription-mcp` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` when stdin closes, `1` on failure.
#[must_use]
pub fn run_tool_server() -> ExitCode {
    init_tracing();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve_stdio()) {
        tracing::error!("Tool server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn serve_stdio() -> anyhow::Result<()> {
    let config = ClinicalConfig::from_env().context("invalid configuration")?;
    config
        .validate_embedding()
        .context("invalid embedding configuration")?;
    let store = Arc::new(
        SqliteRecordStore::open(&config.storage)
            .await
            .context("failed to open record store")?,
    );
    let embedder = build_embedder(&config.embedding).context("failed to build embedder")?;
    tracing::info!(
        provider = ?config.embedding.provider,
        model = %embedder.model_name(),
        "embedding provider ready"
    );

    let retriever = SimilarCaseRetriever::new(store.clone(), embedder, config.retrieval.clone());
    let mut registry = ToolRegistry::new();
    PrescriptionTools::new(store.clone(), retriever, config.clinic.clone())
        .register(&mut registry)
        .context("failed to register tools")?;

    tracing::info!(
        "prescription-mcp v{} serving on stdio",
        env!("CARGO_PKG_VERSION")
    );
    let mut processor = MessageProcessor::new(registry);
    serve(
        &mut processor,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
    .context("tool server channel failed")?;
    drop(processor);

    match Arc::try_unwrap(store) {
        Ok(store) => store.close().await.context("failed to close record store")?,
        Err(_) => tracing::warn!("record store still shared at shutdown, leaving it open"),
    }
    Ok(())
}

/// Run the HTTP backend (used by the `prescription-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run_http_server() -> ExitCode {
    init_tracing();
    tracing::info!("Starting prescription server v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve_http()) {
        tracing::error!("Server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn serve_http() -> anyhow::Result<()> {
    let config = ClinicalConfig::from_env().context("invalid configuration")?;
    let tools = Arc::new(ToolClient::spawn(&config.tool_server).await.with_context(|| {
        format!("failed to start tool server `{}`", config.tool_server.command)
    })?);
    let completion =
        Arc::new(OllamaCompletion::new(&config.llm).context("failed to build completion client")?);
    tracing::info!(model = %config.llm.model, "completion model ready");

    let engine = PrescriptionEngine::new(Arc::clone(&tools), completion);
    let state = AppState::new(Arc::clone(&tools), engine);
    server::run_server_with_shutdown(state, config.http.port, shutdown_signal())
        .await
        .context("http server failed")?;

    tools.shutdown().await.context("failed to stop tool server")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    tracing::info!("Shutdown signal received");
}
