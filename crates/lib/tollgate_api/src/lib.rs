//! # tollgate_api
//!
//! HTTP API library for Tollgate.

pub mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::post;
use tollgate_core::auth::service::TokenService;
use tower_http::trace::TraceLayer;

use crate::handlers::tokens;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Token issuance and rotation.
    pub tokens: Arc<TokenService>,
}

/// Builds the Axum router with all routes and shared state.
///
/// Handlers read the caller's address from `ConnectInfo<SocketAddr>`, so
/// serve with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tokens/refresh", post(tokens::refresh_tokens_handler))
        .route("/tokens/{user_id}", post(tokens::issue_tokens_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
