use std::sync::Arc;

use echo_session_mcp::{
    build_app,
    config::Config,
    logging,
    mcp::server::McpEngineFactory,
    session::{CloseReason, SessionRegistry},
    AppState,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;
    let sessions = SessionRegistry::new();
    let state = AppState::new(
        config.api_token.clone(),
        sessions.clone(),
        Arc::new(McpEngineFactory),
        config.sse_keep_alive,
    );
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        auth = config.api_token.is_some(),
        "server starting"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(sessions))
        .await?;
    Ok(())
}

async fn shutdown_signal(sessions: SessionRegistry) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    // Open event streams only end once their sessions close.
    let closed = sessions.close_all(CloseReason::Shutdown);
    info!(closed_sessions = closed, "server shutting down");
}
