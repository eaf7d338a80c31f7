use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Booking, BookingEvent, BookingStatus, PaymentAttempt};
use crate::services::lifecycle::{self, load_booking, Actor};
use crate::services::{approval, cancellation};
use crate::state::AppState;

use super::bookings::parse_status_filter;

const CATCHUP_LIMIT: i64 = 500;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Admin identity recorded on reviews. Falls back to a generic name when the
/// console does not send one.
fn admin_id(headers: &HeaderMap) -> String {
    headers
        .get("x-admin-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("admin")
        .to_string()
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let filter = queries::BookingFilter {
        status: parse_status_filter(query.status.as_deref())?,
        ..Default::default()
    };
    let bookings = {
        let conn = db::lock(&state.db);
        queries::list_bookings(&conn, &filter, query.limit.unwrap_or(50).clamp(1, 500))?
    };
    Ok(Json(bookings))
}

// GET /api/admin/bookings/:id
#[derive(Serialize)]
pub struct AdminBookingResponse {
    #[serde(flatten)]
    booking: Booking,
    contact_visible: bool,
    events: Vec<BookingEvent>,
    payment_attempts: Vec<PaymentAttempt>,
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AdminBookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let (booking, events, payment_attempts) = {
        let conn = db::lock(&state.db);
        let booking = load_booking(&conn, &id)?;
        let events = queries::get_booking_events(&conn, &id)?;
        let attempts = queries::list_payment_attempts(&conn, &id)?;
        (booking, events, attempts)
    };

    Ok(Json(AdminBookingResponse {
        contact_visible: booking.contact_visible(),
        booking,
        events,
        payment_attempts,
    }))
}

// POST /api/admin/bookings/:id/approve
#[derive(Deserialize, Default)]
pub struct ApproveRequest {
    pub notes: Option<String>,
}

pub async fn approve_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ApproveRequest>>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let booking =
        approval::approve_booking(&state, &id, &admin_id(&headers), req.notes.as_deref()).await?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/reject
#[derive(Deserialize, Default)]
pub struct RejectRequest {
    pub reason: Option<String>,
    pub notes: Option<String>,
}

pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let booking = approval::reject_booking(
        &state,
        &id,
        &admin_id(&headers),
        req.reason.as_deref(),
        req.notes.as_deref(),
    )
    .await?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/cancel
#[derive(Deserialize, Default)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let admin = admin_id(&headers);

    let booking =
        cancellation::cancel_booking(&state, &id, Actor::Admin(&admin), req.reason.as_deref())
            .await?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/status
#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub(crate) fn parse_target(status: &str) -> Result<BookingStatus, AppError> {
    BookingStatus::parse(status.trim())
        .ok_or_else(|| AppError::BadRequest(format!("unknown booking status: {status}")))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let target = parse_target(&req.status)?;
    let admin = admin_id(&headers);

    let booking = lifecycle::progress_booking(&state, &id, Actor::Admin(&admin), target)?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/remaining-paid
pub async fn record_remaining_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let booking = lifecycle::remaining_payment_received(&state, &id)?;
    Ok(Json(booking))
}

// GET /api/admin/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<queries::DashboardStats>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let stats = {
        let conn = db::lock(&state.db);
        queries::get_dashboard_stats(&conn)?
    };
    Ok(Json(stats))
}

// GET /api/admin/events (SSE)
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
    pub last_id: Option<i64>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // EventSource can't set headers, so the token travels in the query
    let token = query.token.as_deref().unwrap_or("");
    if state.config.admin_token.is_empty() || token != state.config.admin_token {
        return Err(AppError::Unauthorized);
    }

    let last_id = query.last_id.unwrap_or(0);

    // Subscribe before reading the backlog so nothing falls in between
    let rx = state.events_tx.subscribe();
    let catchup_events = {
        let conn = db::lock(&state.db);
        queries::get_booking_events_since(&conn, last_id, CATCHUP_LIMIT)?
    };
    let newest_replayed = catchup_events.last().map(|e| e.id).unwrap_or(last_id);

    let catchup_stream = tokio_stream::iter(catchup_events.into_iter().map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(
            Event::default()
                .id(event.id.to_string())
                .data(data)
                .event("booking_event"),
        )
    }));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.id > newest_replayed => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default()
                .id(event.id.to_string())
                .data(data)
                .event("booking_event")))
        }
        Ok(_) => None,
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "admin event stream lagged");
            None
        }
    });

    let keepalive_stream = tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(
        Duration::from_secs(30),
    ))
    .map(|_| Ok(Event::default().comment("keepalive")));

    let combined = catchup_stream.chain(live_stream);
    let merged = combined.merge(keepalive_stream);

    Ok(Sse::new(merged))
}
