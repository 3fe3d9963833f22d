//! Token issuance and refresh handlers.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};

/// Token pair returned by both endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Query string of `POST /tokens/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshParams {
    pub refresh_token: Option<String>,
}

/// `POST /tokens/{user_id}`: issue a new token pair.
pub async fn issue_tokens_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(user_id): Path<String>,
) -> AppResult<Json<TokenResponse>> {
    info!(user_id = %user_id, peer = %peer, "issue tokens");

    if user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id is required".into()));
    }

    let ip = peer.ip().to_string();
    let pair = state.tokens.issue_tokens(&user_id, &ip).await?;
    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// `POST /tokens/refresh?refresh_token=...`: rotate a token pair.
pub async fn refresh_tokens_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<RefreshParams>,
) -> AppResult<Json<TokenResponse>> {
    info!(peer = %peer, "refresh tokens");

    let refresh_token = params
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("refresh_token is required".into()))?;

    let ip = peer.ip().to_string();
    let pair = state.tokens.refresh_tokens(&refresh_token, &ip).await?;
    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}
