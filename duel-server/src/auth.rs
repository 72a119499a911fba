//! `GET /gam/api/v1/get_auth_token/` — exchanges an already-authenticated
//! user cookie for a single-use game auth token, per spec §6.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;

use crate::error::ApiError;
use crate::lobby::AppState;
use crate::registry::mint_game_token;
use crate::user_directory::UserDirectoryError;
use protocol::AuthTokenResponse;

/// Pulls a single cookie's value out of the raw `Cookie` header.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub async fn get_auth_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AuthTokenResponse>, ApiError> {
    let access = cookie_value(&headers, "access").ok_or(ApiError::Unauthenticated)?;
    let refresh = cookie_value(&headers, "refresh").ok_or(ApiError::Unauthenticated)?;

    let tokens = state
        .user_directory
        .get_user(&access, &refresh)
        .await
        .map_err(|err| match err {
            UserDirectoryError::Unauthenticated => ApiError::Unauthenticated,
            UserDirectoryError::Transport(e) => ApiError::UserDirectoryUnavailable(e),
            UserDirectoryError::UnexpectedStatus(_) => ApiError::Unauthenticated,
        })?;

    let token = mint_game_token(state.kv.as_ref(), &tokens.user).await;
    Ok(Json(AuthTokenResponse { token }))
}
