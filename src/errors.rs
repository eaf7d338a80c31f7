use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::BookingStatus;

/// Failures of a booking operation. Precondition variants carry the booking's
/// current status so callers can explain the refusal.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("booking not found")]
    NotFound,

    #[error("service not found")]
    ServiceNotFound,

    #[error("customer not found")]
    CustomerNotFound,

    #[error("service is not available for booking")]
    ServiceUnavailable,

    #[error("booking has already been reviewed")]
    AlreadyReviewed { status: BookingStatus },

    #[error("a rejection reason is required")]
    MissingReason,

    #[error("booking has not been approved yet")]
    NotApprovedYet { status: BookingStatus },

    #[error("advance payment has already been made")]
    AlreadyPaid { status: BookingStatus },

    #[error("advance payment has not been received")]
    AdvanceNotPaid { status: BookingStatus },

    #[error("booking is already cancelled")]
    AlreadyCancelled,

    #[error("booking can no longer be cancelled")]
    NotCancellable { status: BookingStatus },

    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("payment gateway error: {0}")]
    GatewayInit(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "VALIDATION_ERROR",
            BookingError::NotFound => "NOT_FOUND",
            BookingError::ServiceNotFound => "SERVICE_NOT_FOUND",
            BookingError::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            BookingError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            BookingError::AlreadyReviewed { .. } => "ALREADY_REVIEWED",
            BookingError::MissingReason => "MISSING_REASON",
            BookingError::NotApprovedYet { .. } => "NOT_APPROVED_YET",
            BookingError::AlreadyPaid { .. } => "ALREADY_PAID",
            BookingError::AdvanceNotPaid { .. } => "ADVANCE_NOT_PAID",
            BookingError::AlreadyCancelled => "ALREADY_CANCELLED",
            BookingError::NotCancellable { .. } => "NOT_CANCELLABLE",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::GatewayInit(_) => "GATEWAY_INIT_ERROR",
            BookingError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn current_status(&self) -> Option<BookingStatus> {
        match self {
            BookingError::AlreadyReviewed { status }
            | BookingError::NotApprovedYet { status }
            | BookingError::AlreadyPaid { status }
            | BookingError::AdvanceNotPaid { status }
            | BookingError::NotCancellable { status } => Some(*status),
            BookingError::InvalidTransition { from, .. } => Some(*from),
            BookingError::AlreadyCancelled => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation(_) | BookingError::MissingReason => StatusCode::BAD_REQUEST,
            BookingError::NotFound
            | BookingError::ServiceNotFound
            | BookingError::CustomerNotFound => StatusCode::NOT_FOUND,
            BookingError::ServiceUnavailable
            | BookingError::AlreadyReviewed { .. }
            | BookingError::NotApprovedYet { .. }
            | BookingError::AlreadyPaid { .. }
            | BookingError::AdvanceNotPaid { .. }
            | BookingError::AlreadyCancelled
            | BookingError::NotCancellable { .. }
            | BookingError::InvalidTransition { .. } => StatusCode::CONFLICT,
            BookingError::GatewayInit(_) => StatusCode::BAD_GATEWAY,
            BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        BookingError::Internal(e.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Booking(BookingError::Internal(e)) => {
                tracing::error!(error = %e, "booking operation failed");
                internal_body()
            }
            AppError::Booking(BookingError::GatewayInit(e)) => {
                tracing::warn!(error = %e, "payment gateway initiation failed");
                (
                    StatusCode::BAD_GATEWAY,
                    serde_json::json!({
                        "error": "GATEWAY_INIT_ERROR",
                        "message": "payment gateway is unavailable, please retry",
                    }),
                )
            }
            AppError::Booking(e) => {
                let mut body = serde_json::json!({
                    "error": e.code(),
                    "message": e.to_string(),
                });
                if let Some(current) = e.current_status() {
                    body["status"] = serde_json::json!(current.as_str());
                }
                (e.status_code(), body)
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": "UNAUTHORIZED", "message": "unauthorized" }),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "BAD_REQUEST", "message": msg }),
            ),
            AppError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                internal_body()
            }
        };

        (status, Json(body)).into_response()
    }
}

fn internal_body() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        serde_json::json!({ "error": "INTERNAL_ERROR", "message": "internal error" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_carries_status() {
        let err = BookingError::AlreadyPaid {
            status: BookingStatus::PaymentCompleted,
        };
        assert_eq!(err.code(), "ALREADY_PAID");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.current_status(), Some(BookingStatus::PaymentCompleted));
    }

    #[tokio::test]
    async fn test_internal_detail_is_not_exposed() {
        let res = AppError::from(BookingError::Internal(anyhow::anyhow!("disk I/O error at /var/db")))
            .into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("/var/db"));
        assert!(text.contains("INTERNAL_ERROR"));
    }
}
