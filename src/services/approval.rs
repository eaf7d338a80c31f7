use rusqlite::Connection;

use crate::db::{self, queries};
use crate::errors::BookingError;
use crate::models::{Booking, BookingStatus};
use crate::services::lifecycle::load_booking;
use crate::services::{activity, notify};
use crate::state::AppState;

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn already_reviewed(booking: &Booking) -> BookingError {
    if booking.status == BookingStatus::Cancelled {
        BookingError::AlreadyCancelled
    } else {
        BookingError::AlreadyReviewed {
            status: booking.status,
        }
    }
}

/// Authorizes a pending booking for payment. Has no payment or contact
/// side effects.
pub fn approve(
    conn: &Connection,
    booking_id: &str,
    admin_id: &str,
    notes: Option<&str>,
) -> Result<Booking, BookingError> {
    let booking = load_booking(conn, booking_id)?;
    if booking.status != BookingStatus::Pending {
        return Err(already_reviewed(&booking));
    }

    if !queries::mark_approved(conn, booking_id, admin_id, non_blank(notes), &queries::now())? {
        return Err(already_reviewed(&load_booking(conn, booking_id)?));
    }

    tracing::info!(booking_id, admin_id, "booking approved");
    load_booking(conn, booking_id)
}

pub fn reject(
    conn: &Connection,
    booking_id: &str,
    admin_id: &str,
    reason: Option<&str>,
    notes: Option<&str>,
) -> Result<Booking, BookingError> {
    let booking = load_booking(conn, booking_id)?;
    if booking.status != BookingStatus::Pending {
        return Err(already_reviewed(&booking));
    }
    let reason = non_blank(reason).ok_or(BookingError::MissingReason)?;

    if !queries::mark_rejected(
        conn,
        booking_id,
        admin_id,
        reason,
        non_blank(notes),
        &queries::now(),
    )? {
        return Err(already_reviewed(&load_booking(conn, booking_id)?));
    }

    tracing::info!(booking_id, admin_id, reason, "booking rejected");
    load_booking(conn, booking_id)
}

pub async fn approve_booking(
    state: &AppState,
    booking_id: &str,
    admin_id: &str,
    notes: Option<&str>,
) -> Result<Booking, BookingError> {
    let booking = {
        let conn = db::lock(&state.db);
        approve(&conn, booking_id, admin_id, notes)?
    };
    activity::record_booking_event(
        state,
        booking_id,
        "booking_approved",
        booking.status,
        &format!("approved by {admin_id}"),
    );
    notify::booking_approved(state, &booking);
    Ok(booking)
}

pub async fn reject_booking(
    state: &AppState,
    booking_id: &str,
    admin_id: &str,
    reason: Option<&str>,
    notes: Option<&str>,
) -> Result<Booking, BookingError> {
    let booking = {
        let conn = db::lock(&state.db);
        reject(&conn, booking_id, admin_id, reason, notes)?
    };
    let reason = booking.admin_approval.rejection_reason.as_deref().unwrap_or_default();
    activity::record_booking_event(
        state,
        booking_id,
        "booking_rejected",
        booking.status,
        &format!("rejected by {admin_id}: {reason}"),
    );
    notify::booking_rejected(state, &booking);
    Ok(booking)
}
