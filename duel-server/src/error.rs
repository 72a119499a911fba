//! HTTP/WebSocket-facing error type. Unlike `duel_core::error::SessionError`
//! (an internal invariant violation), [`ApiError`] models failures at the
//! edges named in spec §7: bad tokens, a User Directory that's down, and
//! malformed sheets rejected at the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no identity cookie/header present")]
    Unauthenticated,
    #[error("game auth token is unknown, already used, or bound to a different username")]
    InvalidGameToken,
    #[error("room token does not correspond to a live session")]
    UnknownRoom,
    #[error("character sheet rejected: {0}")]
    InvalidCharacterSheet(#[from] duel_core::error::SessionError),
    #[error("user directory is unavailable: {0}")]
    UserDirectoryUnavailable(#[from] reqwest::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InvalidGameToken | ApiError::UnknownRoom => StatusCode::FORBIDDEN,
            ApiError::InvalidCharacterSheet(_) => StatusCode::BAD_REQUEST,
            ApiError::UserDirectoryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}
