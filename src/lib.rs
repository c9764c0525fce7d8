use std::{sync::Arc, time::Duration};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod session;

use mcp::engine::EngineFactory;
use session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub api_token: Option<Arc<str>>,
    pub sessions: SessionRegistry,
    pub engines: Arc<dyn EngineFactory>,
    pub sse_keep_alive: Duration,
}

impl AppState {
    pub fn new(
        api_token: Option<String>,
        sessions: SessionRegistry,
        engines: Arc<dyn EngineFactory>,
        sse_keep_alive: Duration,
    ) -> Self {
        Self {
            api_token: api_token.map(Arc::<str>::from),
            sessions,
            engines,
            sse_keep_alive,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/mcp",
            post(http::handlers::mcp_post)
                .get(http::handlers::mcp_get)
                .delete(http::handlers::mcp_delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/", get(http::handlers::root))
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
