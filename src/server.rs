//! MCP server initialization for stdio and SSE transports.
//!
//! Provides [`serve_stdio`] and [`serve_sse`] entry points that wire up the usage
//! database, the RAG pipeline, and the MCP tool handler into a running server.

use anyhow::{Context, Result};
use groundwork::config::GroundworkConfig;
use groundwork::db;
use groundwork::governor::SqliteUsageStore;
use groundwork::RagPipeline;
use rmcp::ServiceExt;
use std::sync::Arc;

use crate::tools::GroundworkTools;

/// Shared setup: open the usage DB and build the pipeline around it.
pub fn build_pipeline(config: &GroundworkConfig) -> Result<Arc<RagPipeline>> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "usage database ready");

    let store = Arc::new(SqliteUsageStore::new(conn));
    let pipeline = RagPipeline::from_config(config, store)
        .context("failed to initialise RAG pipeline (run `groundwork doctor`)")?;
    Ok(Arc::new(pipeline))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: GroundworkConfig) -> Result<()> {
    tracing::info!("starting groundwork MCP server on stdio");

    let pipeline = build_pipeline(&config)?;

    let tools = GroundworkTools::new(pipeline);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP (SSE) transport.
pub async fn serve_sse(config: GroundworkConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(addr = %bind_addr, "starting groundwork MCP server on SSE/HTTP");

    let pipeline = build_pipeline(&config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(GroundworkTools::new(pipeline.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down SSE server");
        })
        .await?;

    Ok(())
}
