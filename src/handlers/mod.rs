pub mod admin;
pub mod bookings;
pub mod health;
pub mod payments;
pub mod vendor;

use axum::http::HeaderMap;

use crate::errors::AppError;

/// Reads an identity header set by the upstream auth layer.
pub(crate) fn identity(headers: &HeaderMap, name: &str) -> Result<String, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or(AppError::Unauthorized)
}
