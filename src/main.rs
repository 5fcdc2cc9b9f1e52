use std::process::ExitCode;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use kb_chat_backend::core::config::AppConfig;
use kb_chat_backend::core::logging;
use kb_chat_backend::server;
use kb_chat_backend::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;
    logging::init(&config.runtime.log_dir);

    let state = AppState::initialize(&config).await?;
    if !state.cache.is_ready().await {
        tracing::warn!("Vector store is not ready yet; requests will fail until it is");
    }

    let bind_addr = format!("{}:{}", config.runtime.host, config.runtime.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
