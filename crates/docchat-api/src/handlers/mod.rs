//! API handlers

pub mod chat;
pub mod documents;
pub mod health;

use crate::error::AppError;
use axum::http::HeaderMap;

/// Header carrying the externally authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Required owner id from the `X-User-Id` header
pub fn require_owner(headers: &HeaderMap) -> Result<String, AppError> {
    optional_owner(headers)
        .ok_or_else(|| AppError::BadRequest(format!("missing {USER_ID_HEADER} header")))
}

/// Optional owner id from the `X-User-Id` header
pub fn optional_owner(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
