use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::Booking;
use crate::services::disclosure;
use crate::services::lifecycle::{self, Actor};
use crate::state::AppState;

use super::admin::{parse_target, StatusRequest};
use super::bookings::{parse_status_filter, ListQuery};
use super::identity;

const VENDOR_HEADER: &str = "x-vendor-id";

// GET /api/vendor/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let vendor_id = identity(&headers, VENDOR_HEADER)?;
    let filter = queries::BookingFilter {
        status: parse_status_filter(query.status.as_deref())?,
        customer_id: None,
        vendor_id: Some(&vendor_id),
    };
    let bookings = {
        let conn = db::lock(&state.db);
        queries::list_bookings(&conn, &filter, query.limit.unwrap_or(50).clamp(1, 200))?
    };
    Ok(Json(bookings.into_iter().map(disclosure::vendor_view).collect()))
}

// GET /api/vendor/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<queries::VendorStats>, AppError> {
    let vendor_id = identity(&headers, VENDOR_HEADER)?;
    let stats = {
        let conn = db::lock(&state.db);
        queries::get_vendor_stats(&conn, &vendor_id)?
    };
    Ok(Json(stats))
}

// POST /api/vendor/bookings/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Booking>, AppError> {
    let vendor_id = identity(&headers, VENDOR_HEADER)?;
    let target = parse_target(&req.status)?;

    let booking = lifecycle::progress_booking(&state, &id, Actor::Vendor(&vendor_id), target)?;
    Ok(Json(disclosure::vendor_view(booking)))
}
