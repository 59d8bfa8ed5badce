//! Application routing
//!
//! Transport routes and the connection-level layers around them. The layers
//! run once per HTTP request and are never re-entered by a retried call.

use axum::{
    middleware,
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::middleware::{cors, log_request, CorsPolicy};
use crate::server::{rest, rpc, state::AppState};

/// Create the main application router
pub fn create_router(state: AppState) -> anyhow::Result<Router> {
    let cors_policy = Arc::new(CorsPolicy::from_settings(&state.settings.cors)?);
    let settings = state.settings.clone();

    // `/api/*path` also carries the auth proxy and the API reference; they
    // are told apart inside the handler.
    let router = Router::new()
        .route("/health", get(rest::root))
        .route("/ready", get(rest::root))
        .route("/rpc", post(rpc::batch))
        .route("/rpc/*path", any(rpc::handle))
        .route("/api/*path", any(rest::api))
        .fallback(rest::not_found)
        // Last added runs first: logging, then CORS, then compression
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn_with_state(cors_policy, cors))
        .layer(middleware::from_fn_with_state(settings, log_request))
        .with_state(state);

    Ok(router)
}
