use rusqlite::Connection;

use crate::db::{self, queries};
use crate::errors::BookingError;
use crate::models::{Booking, BookingStatus};
use crate::services::activity;
use crate::state::AppState;

/// Who is acting on a booking. Customers and vendors only see their own.
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    Admin(&'a str),
    Customer(&'a str),
    Vendor(&'a str),
}

impl<'a> Actor<'a> {
    pub fn id(&self) -> &'a str {
        match *self {
            Actor::Admin(id) | Actor::Customer(id) | Actor::Vendor(id) => id,
        }
    }

    pub fn can_see(&self, booking: &Booking) -> bool {
        match self {
            Actor::Admin(_) => true,
            Actor::Customer(id) => booking.customer_id == *id,
            Actor::Vendor(id) => booking.vendor_id == *id,
        }
    }
}

pub fn load_booking(conn: &Connection, booking_id: &str) -> Result<Booking, BookingError> {
    queries::get_booking_by_id(conn, booking_id)?.ok_or(BookingError::NotFound)
}

/// Loads a booking on behalf of `actor`. Bookings belonging to someone else
/// are reported as missing.
pub fn load_for(conn: &Connection, booking_id: &str, actor: Actor<'_>) -> Result<Booking, BookingError> {
    let booking = load_booking(conn, booking_id)?;
    if !actor.can_see(&booking) {
        return Err(BookingError::NotFound);
    }
    Ok(booking)
}

/// Moves a paid booking forward along confirmed → vendor_contacted →
/// in_progress → completed. Steps may be skipped; nothing moves backwards.
pub fn progress(
    conn: &Connection,
    booking_id: &str,
    actor: Actor<'_>,
    target: BookingStatus,
) -> Result<Booking, BookingError> {
    if matches!(actor, Actor::Customer(_)) {
        return Err(BookingError::NotFound);
    }

    let booking = load_for(conn, booking_id, actor)?;
    if booking.cancellation.cancelled {
        return Err(BookingError::AlreadyCancelled);
    }
    if !booking.status.can_progress_to(target) {
        return Err(BookingError::InvalidTransition {
            from: booking.status,
            to: target,
        });
    }

    if !queries::progress_status(conn, booking_id, booking.status, target, &queries::now())? {
        let current = load_booking(conn, booking_id)?;
        return Err(BookingError::InvalidTransition {
            from: current.status,
            to: target,
        });
    }

    tracing::info!(booking_id, from = %booking.status, to = %target, "booking progressed");
    load_booking(conn, booking_id)
}

/// Marks the balance after the advance as received.
pub fn record_remaining_payment(conn: &Connection, booking_id: &str) -> Result<Booking, BookingError> {
    let booking = load_booking(conn, booking_id)?;
    if booking.cancellation.cancelled {
        return Err(BookingError::AlreadyCancelled);
    }
    if !booking.payment.advance_paid {
        return Err(BookingError::AdvanceNotPaid {
            status: booking.status,
        });
    }
    if booking.payment.remaining_paid {
        return Err(BookingError::AlreadyPaid {
            status: booking.status,
        });
    }

    if !queries::mark_remaining_paid(conn, booking_id, &queries::now())? {
        let current = load_booking(conn, booking_id)?;
        return Err(BookingError::AlreadyPaid {
            status: current.status,
        });
    }

    tracing::info!(booking_id, "remaining payment recorded");
    load_booking(conn, booking_id)
}

pub fn progress_booking(
    state: &AppState,
    booking_id: &str,
    actor: Actor<'_>,
    target: BookingStatus,
) -> Result<Booking, BookingError> {
    let booking = {
        let conn = db::lock(&state.db);
        progress(&conn, booking_id, actor, target)?
    };
    activity::record_booking_event(
        state,
        booking_id,
        "status_changed",
        booking.status,
        &format!("moved to {target} by {}", actor.id()),
    );
    Ok(booking)
}

pub fn remaining_payment_received(state: &AppState, booking_id: &str) -> Result<Booking, BookingError> {
    let booking = {
        let conn = db::lock(&state.db);
        record_remaining_payment(&conn, booking_id)?
    };
    activity::record_booking_event(
        state,
        booking_id,
        "remaining_paid",
        booking.status,
        &format!("balance {} received", booking.pricing.remaining_payment),
    );
    Ok(booking)
}
