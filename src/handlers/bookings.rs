use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::BookingStatus;
use crate::services::cancellation;
use crate::services::disclosure::{self, CustomerBookingView};
use crate::services::intake::{self, BookingCreated, BookingRequest};
use crate::services::lifecycle::{load_for, Actor};
use crate::services::payment::orchestrator::{self, Outcome, PaymentStarted};
use crate::state::AppState;

use super::identity;

const CUSTOMER_HEADER: &str = "x-customer-id";

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingCreated>), AppError> {
    let customer_id = identity(&headers, CUSTOMER_HEADER)?;
    let created = intake::create_booking(&state, &customer_id, &req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub(crate) fn parse_status_filter(status: Option<&str>) -> Result<Option<BookingStatus>, AppError> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => BookingStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("unknown booking status: {s}"))),
    }
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CustomerBookingView>>, AppError> {
    let customer_id = identity(&headers, CUSTOMER_HEADER)?;
    let filter = queries::BookingFilter {
        status: parse_status_filter(query.status.as_deref())?,
        customer_id: Some(&customer_id),
        vendor_id: None,
    };
    let bookings = {
        let conn = db::lock(&state.db);
        queries::list_bookings(&conn, &filter, query.limit.unwrap_or(50).clamp(1, 200))?
    };

    let mut views = Vec::with_capacity(bookings.len());
    for booking in bookings {
        views.push(disclosure::customer_view(&state, booking).await);
    }
    Ok(Json(views))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<CustomerBookingView>, AppError> {
    let customer_id = identity(&headers, CUSTOMER_HEADER)?;
    let booking = {
        let conn = db::lock(&state.db);
        load_for(&conn, &id, Actor::Customer(&customer_id))?
    };
    Ok(Json(disclosure::customer_view(&state, booking).await))
}

// POST /api/bookings/:id/pay
pub async fn initiate_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PaymentStarted>, AppError> {
    let customer_id = identity(&headers, CUSTOMER_HEADER)?;
    let started = orchestrator::initiate_payment(&state, &customer_id, &id).await?;
    Ok(Json(started))
}

// POST /api/bookings/:id/verify-payment
#[derive(Deserialize)]
pub struct VerifyRequest {
    pub transaction_id: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub outcome: Outcome,
    pub booking: CustomerBookingView,
}

pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let customer_id = identity(&headers, CUSTOMER_HEADER)?;
    let transaction_id = req.transaction_id.trim();
    if transaction_id.is_empty() {
        return Err(AppError::BadRequest("transaction_id is required".to_string()));
    }

    let reconciled = orchestrator::verify_payment(&state, &customer_id, &id, transaction_id).await?;
    Ok(Json(VerifyResponse {
        outcome: reconciled.outcome,
        booking: disclosure::customer_view(&state, reconciled.booking).await,
    }))
}

// POST /api/bookings/:id/cancel
#[derive(Deserialize, Default)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<CustomerBookingView>, AppError> {
    let customer_id = identity(&headers, CUSTOMER_HEADER)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let booking = cancellation::cancel_booking(
        &state,
        &id,
        Actor::Customer(&customer_id),
        req.reason.as_deref(),
    )
    .await?;
    Ok(Json(disclosure::customer_view(&state, booking).await))
}
