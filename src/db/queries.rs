use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{named_params, params, Connection, OptionalExtension};
use serde::Serialize;

use crate::models::{
    AdminApproval, Booking, BookingEvent, BookingStatus, Cancellation, CancelledBy,
    CustomerSnapshot, PackageSnapshot, PaymentAttempt, PaymentInfo, PaymentStatus, Pricing,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const BOOKING_COLUMNS: &str = "id, customer_id, service_id, vendor_id, \
    customer_name, customer_email, customer_phone, event_date, event_address, event_city, special_requests, \
    package_name, package_price, package_features, \
    advance_payment, remaining_payment, total_price, booking_status, \
    admin_approved, admin_approved_by, admin_approved_at, admin_rejection_reason, admin_notes, \
    transaction_id, advance_paid, advance_paid_at, remaining_paid, remaining_paid_at, payment_status, validation_id, \
    vendor_contact_shared, \
    cancelled, cancelled_by, cancelled_at, cancellation_reason, refund_processed, refund_amount, refund_reference, \
    created_at, updated_at";

pub fn format_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

pub fn now() -> NaiveDateTime {
    // Second precision, matching what is stored.
    let now = Utc::now().naive_utc();
    NaiveDateTime::parse_from_str(&format_ts(&now), TS_FORMAT).unwrap_or(now)
}

fn format_opt_ts(dt: &Option<NaiveDateTime>) -> Option<String> {
    dt.as_ref().map(format_ts)
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid timestamp {s:?}: {e}"))
}

fn parse_opt_ts(s: Option<String>) -> anyhow::Result<Option<NaiveDateTime>> {
    s.as_deref().map(parse_ts).transpose()
}

/// Quoted SQL list of statuses for `IN (...)` guards. Values come from
/// `BookingStatus::as_str`, never from input.
fn status_list(statuses: &[BookingStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Bookings ──

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let features = serde_json::to_string(&booking.package.features)?;

    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES (
                :id, :customer_id, :service_id, :vendor_id,
                :customer_name, :customer_email, :customer_phone, :event_date, :event_address, :event_city, :special_requests,
                :package_name, :package_price, :package_features,
                :advance_payment, :remaining_payment, :total_price, :booking_status,
                :admin_approved, :admin_approved_by, :admin_approved_at, :admin_rejection_reason, :admin_notes,
                :transaction_id, :advance_paid, :advance_paid_at, :remaining_paid, :remaining_paid_at, :payment_status, :validation_id,
                :vendor_contact_shared,
                :cancelled, :cancelled_by, :cancelled_at, :cancellation_reason, :refund_processed, :refund_amount, :refund_reference,
                :created_at, :updated_at
            )"
        ),
        named_params! {
            ":id": booking.id,
            ":customer_id": booking.customer_id,
            ":service_id": booking.service_id,
            ":vendor_id": booking.vendor_id,
            ":customer_name": booking.customer.name,
            ":customer_email": booking.customer.email,
            ":customer_phone": booking.customer.phone,
            ":event_date": booking.customer.event_date.format(DATE_FORMAT).to_string(),
            ":event_address": booking.customer.event_address,
            ":event_city": booking.customer.event_city,
            ":special_requests": booking.customer.special_requests,
            ":package_name": booking.package.name,
            ":package_price": booking.package.price,
            ":package_features": features,
            ":advance_payment": booking.pricing.advance_payment,
            ":remaining_payment": booking.pricing.remaining_payment,
            ":total_price": booking.pricing.total_price,
            ":booking_status": booking.status.as_str(),
            ":admin_approved": booking.admin_approval.approved,
            ":admin_approved_by": booking.admin_approval.approved_by,
            ":admin_approved_at": format_opt_ts(&booking.admin_approval.approved_at),
            ":admin_rejection_reason": booking.admin_approval.rejection_reason,
            ":admin_notes": booking.admin_approval.notes,
            ":transaction_id": booking.payment.transaction_id,
            ":advance_paid": booking.payment.advance_paid,
            ":advance_paid_at": format_opt_ts(&booking.payment.advance_paid_at),
            ":remaining_paid": booking.payment.remaining_paid,
            ":remaining_paid_at": format_opt_ts(&booking.payment.remaining_paid_at),
            ":payment_status": booking.payment.status.as_str(),
            ":validation_id": booking.payment.validation_id,
            ":vendor_contact_shared": booking.vendor_contact_shared,
            ":cancelled": booking.cancellation.cancelled,
            ":cancelled_by": booking.cancellation.cancelled_by.map(|c| c.as_str()),
            ":cancelled_at": format_opt_ts(&booking.cancellation.cancelled_at),
            ":cancellation_reason": booking.cancellation.reason,
            ":refund_processed": booking.cancellation.refund_processed,
            ":refund_amount": booking.cancellation.refund_amount,
            ":refund_reference": booking.cancellation.refund_reference,
            ":created_at": format_ts(&booking.created_at),
            ":updated_at": format_ts(&booking.updated_at),
        },
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn get_booking_by_transaction(
    conn: &Connection,
    transaction_id: &str,
) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE transaction_id = ?1"),
            params![transaction_id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    result.transpose()
}

#[derive(Debug, Default, Clone)]
pub struct BookingFilter<'a> {
    pub status: Option<BookingStatus>,
    pub customer_id: Option<&'a str>,
    pub vendor_id: Option<&'a str>,
}

pub fn list_bookings(
    conn: &Connection,
    filter: &BookingFilter<'_>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut clauses: Vec<&str> = vec![];
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![];

    if let Some(status) = filter.status {
        clauses.push("booking_status = ?");
        params_vec.push(Box::new(status.as_str()));
    }
    if let Some(customer_id) = filter.customer_id {
        clauses.push("customer_id = ?");
        params_vec.push(Box::new(customer_id.to_string()));
    }
    if let Some(vendor_id) = filter.vendor_id {
        clauses.push("vendor_id = ?");
        params_vec.push(Box::new(vendor_id.to_string()));
    }
    params_vec.push(Box::new(limit));

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings {where_sql} ORDER BY created_at DESC, id ASC LIMIT ?"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn mark_approved(
    conn: &Connection,
    id: &str,
    admin_id: &str,
    notes: Option<&str>,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let at = format_ts(at);
    let count = conn.execute(
        "UPDATE bookings SET
            booking_status = 'approved',
            admin_approved = 1,
            admin_approved_by = ?2,
            admin_approved_at = ?3,
            admin_rejection_reason = NULL,
            admin_notes = ?4,
            updated_at = ?3
         WHERE id = ?1 AND booking_status = 'pending' AND cancelled = 0",
        params![id, admin_id, at, notes],
    )?;
    Ok(count > 0)
}

pub fn mark_rejected(
    conn: &Connection,
    id: &str,
    admin_id: &str,
    reason: &str,
    notes: Option<&str>,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let at = format_ts(at);
    let count = conn.execute(
        "UPDATE bookings SET
            booking_status = 'rejected',
            admin_approved = 0,
            admin_approved_by = ?2,
            admin_approved_at = ?3,
            admin_rejection_reason = ?4,
            admin_notes = ?5,
            updated_at = ?3
         WHERE id = ?1 AND booking_status = 'pending' AND cancelled = 0",
        params![id, admin_id, at, reason, notes],
    )?;
    Ok(count > 0)
}

/// Records a fresh gateway transaction and moves the booking to
/// `payment_pending`. Accepted from `approved` and from an abandoned
/// `payment_pending` attempt. Earlier attempts stay in `payment_attempts`.
pub fn start_payment(
    conn: &Connection,
    id: &str,
    transaction_id: &str,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let at = format_ts(at);
    let count = conn.execute(
        "UPDATE bookings SET
            booking_status = 'payment_pending',
            transaction_id = ?2,
            validation_id = NULL,
            updated_at = ?3
         WHERE id = ?1
           AND booking_status IN ('approved', 'payment_pending')
           AND advance_paid = 0
           AND cancelled = 0",
        params![id, transaction_id, at],
    )?;
    if count == 0 {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO payment_attempts (transaction_id, booking_id, amount, created_at)
         SELECT ?2, id, advance_payment, ?3 FROM bookings WHERE id = ?1",
        params![id, transaction_id, at],
    )?;
    Ok(true)
}

/// Applies the gateway-success effect for `transaction_id` if the booking is
/// in one of `from`. Returns false when nothing changed, which includes every
/// repeated delivery.
pub fn complete_advance_payment(
    conn: &Connection,
    transaction_id: &str,
    validation_id: Option<&str>,
    from: &[BookingStatus],
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let sql = format!(
        "UPDATE bookings SET
            booking_status = 'payment_completed',
            advance_paid = 1,
            advance_paid_at = ?3,
            payment_status = 'advance_paid',
            validation_id = COALESCE(?2, validation_id),
            vendor_contact_shared = 1,
            updated_at = ?3
         WHERE transaction_id = ?1
           AND advance_paid = 0
           AND cancelled = 0
           AND booking_status IN ({})",
        status_list(from)
    );
    let count = conn.execute(&sql, params![transaction_id, validation_id, format_ts(at)])?;
    Ok(count > 0)
}

/// Success for the current transaction of a booking that was cancelled while
/// the customer was still at the checkout. The capture is recorded and owed
/// back at once; contact stays hidden.
pub fn record_capture_after_cancel(
    conn: &Connection,
    transaction_id: &str,
    validation_id: Option<&str>,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
            advance_paid = 1,
            advance_paid_at = ?3,
            validation_id = COALESCE(?2, validation_id),
            payment_status = 'refunded',
            refund_processed = 1,
            refund_amount = advance_payment,
            vendor_contact_shared = 0,
            updated_at = ?3
         WHERE transaction_id = ?1
           AND cancelled = 1
           AND advance_paid = 0",
        params![transaction_id, validation_id, format_ts(at)],
    )?;
    Ok(count > 0)
}

/// Success for a superseded transaction of a booking that is still unpaid.
/// The booking switches back to that transaction and takes the success
/// effect, so the newer checkout becomes the superseded one.
pub fn adopt_attempt(
    conn: &Connection,
    booking_id: &str,
    transaction_id: &str,
    validation_id: Option<&str>,
    from: &[BookingStatus],
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let sql = format!(
        "UPDATE bookings SET
            booking_status = 'payment_completed',
            transaction_id = ?2,
            advance_paid = 1,
            advance_paid_at = ?4,
            payment_status = 'advance_paid',
            validation_id = ?3,
            vendor_contact_shared = 1,
            updated_at = ?4
         WHERE id = ?1
           AND advance_paid = 0
           AND cancelled = 0
           AND booking_status IN ({})",
        status_list(from)
    );
    let count = conn.execute(
        &sql,
        params![booking_id, transaction_id, validation_id, format_ts(at)],
    )?;
    Ok(count > 0)
}

/// Returns a `payment_pending` booking to `approved` so payment can be retried.
/// Never touches a booking whose advance is already paid.
pub fn revert_payment(
    conn: &Connection,
    transaction_id: &str,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
            booking_status = 'approved',
            updated_at = ?2
         WHERE transaction_id = ?1
           AND booking_status = 'payment_pending'
           AND advance_paid = 0",
        params![transaction_id, format_ts(at)],
    )?;
    Ok(count > 0)
}

pub fn mark_cancelled(
    conn: &Connection,
    id: &str,
    by: CancelledBy,
    reason: Option<&str>,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let cancellable: Vec<BookingStatus> = BookingStatus::ALL
        .into_iter()
        .filter(|s| s.is_cancellable())
        .collect();
    let sql = format!(
        "UPDATE bookings SET
            booking_status = 'cancelled',
            cancelled = 1,
            cancelled_by = ?2,
            cancelled_at = ?3,
            cancellation_reason = ?4,
            refund_processed = advance_paid,
            refund_amount = CASE WHEN advance_paid = 1 THEN advance_payment ELSE 0 END,
            payment_status = CASE WHEN advance_paid = 1 THEN 'refunded' ELSE payment_status END,
            vendor_contact_shared = 0,
            updated_at = ?3
         WHERE id = ?1
           AND cancelled = 0
           AND booking_status IN ({})",
        status_list(&cancellable)
    );
    let count = conn.execute(&sql, params![id, by.as_str(), format_ts(at), reason])?;
    Ok(count > 0)
}

pub fn set_refund_reference(conn: &Connection, id: &str, reference: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET refund_reference = ?2 WHERE id = ?1",
        params![id, reference],
    )?;
    Ok(())
}

/// Moves a paid booking one or more steps along the fulfilment track.
pub fn progress_status(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
            booking_status = ?3,
            vendor_contact_shared = ?4,
            updated_at = ?5
         WHERE id = ?1 AND booking_status = ?2 AND cancelled = 0 AND advance_paid = 1",
        params![
            id,
            from.as_str(),
            to.as_str(),
            to.discloses_contact(),
            format_ts(at)
        ],
    )?;
    Ok(count > 0)
}

pub fn mark_remaining_paid(conn: &Connection, id: &str, at: &NaiveDateTime) -> anyhow::Result<bool> {
    let at = format_ts(at);
    let count = conn.execute(
        "UPDATE bookings SET
            remaining_paid = 1,
            remaining_paid_at = ?2,
            payment_status = 'fully_paid',
            updated_at = ?2
         WHERE id = ?1 AND advance_paid = 1 AND remaining_paid = 0 AND cancelled = 0",
        params![id, at],
    )?;
    Ok(count > 0)
}

// ── Payment Attempts ──

const ATTEMPT_COLUMNS: &str = "transaction_id, booking_id, amount, created_at, captured_at, \
    validation_id, refund_reference";

pub fn get_payment_attempt(
    conn: &Connection,
    transaction_id: &str,
) -> anyhow::Result<Option<PaymentAttempt>> {
    let result = conn
        .query_row(
            &format!("SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE transaction_id = ?1"),
            params![transaction_id],
            |row| Ok(parse_attempt_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn list_payment_attempts(
    conn: &Connection,
    booking_id: &str,
) -> anyhow::Result<Vec<PaymentAttempt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE booking_id = ?1
         ORDER BY created_at ASC, rowid ASC"
    ))?;
    let rows = stmt.query_map(params![booking_id], |row| Ok(parse_attempt_row(row)))?;

    let mut attempts = vec![];
    for row in rows {
        attempts.push(row??);
    }
    Ok(attempts)
}

/// Marks the money for `transaction_id` as captured. False when the capture
/// was already recorded.
pub fn mark_attempt_captured(
    conn: &Connection,
    transaction_id: &str,
    validation_id: Option<&str>,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE payment_attempts SET
            captured_at = ?3,
            validation_id = COALESCE(?2, validation_id)
         WHERE transaction_id = ?1 AND captured_at IS NULL",
        params![transaction_id, validation_id, format_ts(at)],
    )?;
    Ok(count > 0)
}

pub fn set_attempt_refund_reference(
    conn: &Connection,
    transaction_id: &str,
    reference: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE payment_attempts SET refund_reference = ?2 WHERE transaction_id = ?1",
        params![transaction_id, reference],
    )?;
    Ok(())
}

fn parse_attempt_row(row: &rusqlite::Row) -> anyhow::Result<PaymentAttempt> {
    let created_at: String = row.get("created_at")?;
    Ok(PaymentAttempt {
        transaction_id: row.get("transaction_id")?,
        booking_id: row.get("booking_id")?,
        amount: row.get("amount")?,
        created_at: parse_ts(&created_at)?,
        captured_at: parse_opt_ts(row.get("captured_at")?)?,
        validation_id: row.get("validation_id")?,
        refund_reference: row.get("refund_reference")?,
    })
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let status_str: String = row.get("booking_status")?;
    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown booking status: {status_str}"))?;
    let payment_status_str: String = row.get("payment_status")?;
    let payment_status = PaymentStatus::parse(&payment_status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown payment status: {payment_status_str}"))?;

    let event_date_str: String = row.get("event_date")?;
    let event_date = NaiveDate::parse_from_str(&event_date_str, DATE_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid event date {event_date_str:?}: {e}"))?;
    let features_json: String = row.get("package_features")?;
    let features: Vec<String> = serde_json::from_str(&features_json)
        .with_context(|| format!("invalid package features {features_json:?}"))?;

    let cancelled_by: Option<String> = row.get("cancelled_by")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Booking {
        id: row.get("id")?,
        customer_id: row.get("customer_id")?,
        service_id: row.get("service_id")?,
        vendor_id: row.get("vendor_id")?,
        customer: CustomerSnapshot {
            name: row.get("customer_name")?,
            email: row.get("customer_email")?,
            phone: row.get("customer_phone")?,
            event_date,
            event_address: row.get("event_address")?,
            event_city: row.get("event_city")?,
            special_requests: row.get("special_requests")?,
        },
        package: PackageSnapshot {
            name: row.get("package_name")?,
            price: row.get("package_price")?,
            features,
        },
        pricing: Pricing {
            package_price: row.get("package_price")?,
            advance_payment: row.get("advance_payment")?,
            remaining_payment: row.get("remaining_payment")?,
            total_price: row.get("total_price")?,
        },
        status,
        admin_approval: AdminApproval {
            approved: row.get("admin_approved")?,
            approved_by: row.get("admin_approved_by")?,
            approved_at: parse_opt_ts(row.get("admin_approved_at")?)?,
            rejection_reason: row.get("admin_rejection_reason")?,
            notes: row.get("admin_notes")?,
        },
        payment: PaymentInfo {
            transaction_id: row.get("transaction_id")?,
            advance_paid: row.get("advance_paid")?,
            advance_paid_at: parse_opt_ts(row.get("advance_paid_at")?)?,
            remaining_paid: row.get("remaining_paid")?,
            remaining_paid_at: parse_opt_ts(row.get("remaining_paid_at")?)?,
            status: payment_status,
            validation_id: row.get("validation_id")?,
        },
        vendor_contact_shared: row.get("vendor_contact_shared")?,
        cancellation: Cancellation {
            cancelled: row.get("cancelled")?,
            cancelled_by: cancelled_by.as_deref().and_then(CancelledBy::parse),
            cancelled_at: parse_opt_ts(row.get("cancelled_at")?)?,
            reason: row.get("cancellation_reason")?,
            refund_processed: row.get("refund_processed")?,
            refund_amount: row.get("refund_amount")?,
            refund_reference: row.get("refund_reference")?,
        },
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Booking Events ──

pub fn insert_booking_event(
    conn: &Connection,
    booking_id: &str,
    kind: &str,
    status: &str,
    detail: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO booking_events (booking_id, kind, status, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![booking_id, kind, status, detail, format_ts(&now())],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_booking_events(conn: &Connection, booking_id: &str) -> anyhow::Result<Vec<BookingEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, kind, status, detail, created_at
         FROM booking_events WHERE booking_id = ?1
         ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![booking_id], parse_event_row)?;

    let mut events = vec![];
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

pub fn get_booking_events_since(
    conn: &Connection,
    since_id: i64,
    limit: i64,
) -> anyhow::Result<Vec<BookingEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, kind, status, detail, created_at
         FROM booking_events WHERE id > ?1
         ORDER BY id ASC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![since_id, limit], parse_event_row)?;

    let mut events = vec![];
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

fn parse_event_row(row: &rusqlite::Row) -> rusqlite::Result<BookingEvent> {
    Ok(BookingEvent {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        kind: row.get(2)?,
        status: row.get(3)?,
        detail: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// ── Stats ──

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_bookings: i64,
    pub awaiting_review: i64,
    pub advance_collected: i64,
    pub refunded: i64,
    pub by_status: Vec<StatusCount>,
}

pub fn get_dashboard_stats(conn: &Connection) -> anyhow::Result<DashboardStats> {
    let mut stmt = conn.prepare(
        "SELECT booking_status, COUNT(*) FROM bookings GROUP BY booking_status ORDER BY booking_status",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(StatusCount {
            status: row.get(0)?,
            count: row.get(1)?,
        })
    })?;
    let mut by_status = vec![];
    for row in rows {
        by_status.push(row?);
    }

    let (advance_collected, refunded): (i64, i64) = conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN advance_paid = 1 AND refund_processed = 0 THEN advance_payment ELSE 0 END), 0),
            COALESCE(SUM(refund_amount), 0)
         FROM bookings",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let count_of = |status: BookingStatus| {
        by_status
            .iter()
            .find(|c| c.status == status.as_str())
            .map(|c| c.count)
            .unwrap_or(0)
    };

    Ok(DashboardStats {
        total_bookings: by_status.iter().map(|c| c.count).sum(),
        awaiting_review: count_of(BookingStatus::Pending),
        advance_collected,
        refunded,
        by_status,
    })
}

#[derive(Debug, Serialize)]
pub struct VendorStats {
    pub total_bookings: i64,
    pub active_bookings: i64,
    pub completed_bookings: i64,
    pub cancelled_bookings: i64,
    pub advance_collected: i64,
    pub completed_revenue: i64,
}

pub fn get_vendor_stats(conn: &Connection, vendor_id: &str) -> anyhow::Result<VendorStats> {
    let stats = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN booking_status IN ('payment_completed', 'confirmed', 'vendor_contacted', 'in_progress') THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN booking_status = 'completed' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN booking_status = 'cancelled' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN advance_paid = 1 AND refund_processed = 0 THEN advance_payment ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN booking_status = 'completed' THEN total_price ELSE 0 END), 0)
         FROM bookings WHERE vendor_id = ?1",
        params![vendor_id],
        |row| {
            Ok(VendorStats {
                total_bookings: row.get(0)?,
                active_bookings: row.get(1)?,
                completed_bookings: row.get(2)?,
                cancelled_bookings: row.get(3)?,
                advance_collected: row.get(4)?,
                completed_revenue: row.get(5)?,
            })
        },
    )?;
    Ok(stats)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn sample_booking(id: &str) -> Booking {
        let created = now();
        Booking {
            id: id.to_string(),
            customer_id: "cust-1".to_string(),
            service_id: "svc-1".to_string(),
            vendor_id: "vendor-1".to_string(),
            customer: CustomerSnapshot {
                name: "Nadia Rahman".to_string(),
                email: "nadia@example.com".to_string(),
                phone: "+8801700000000".to_string(),
                event_date: NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
                event_address: "House 12, Road 5".to_string(),
                event_city: "Dhaka".to_string(),
                special_requests: None,
            },
            package: PackageSnapshot {
                name: "Gold".to_string(),
                price: 100_000,
                features: vec!["8 hours".to_string(), "Album".to_string()],
            },
            pricing: Pricing::from_package_price(100_000, 10).unwrap(),
            status: BookingStatus::Pending,
            admin_approval: AdminApproval::default(),
            payment: PaymentInfo::default(),
            vendor_contact_shared: false,
            cancellation: Cancellation::default(),
            created_at: created,
            updated_at: created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::sample_booking;
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    #[test]
    fn test_insert_and_load_round_trip() {
        let conn = setup_db();
        let booking = sample_booking("bk-1");
        insert_booking(&conn, &booking).unwrap();

        let loaded = get_booking_by_id(&conn, "bk-1").unwrap().unwrap();
        assert_eq!(loaded.customer, booking.customer);
        assert_eq!(loaded.package, booking.package);
        assert_eq!(loaded.pricing, booking.pricing);
        assert_eq!(loaded.status, BookingStatus::Pending);
        assert_eq!(loaded.payment.status, PaymentStatus::Unpaid);
        assert!(!loaded.vendor_contact_shared);

        assert!(get_booking_by_id(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_pricing_check_constraint_rejects_bad_split() {
        let conn = setup_db();
        let mut booking = sample_booking("bk-bad");
        booking.pricing.remaining_payment += 1;
        assert!(insert_booking(&conn, &booking).is_err());
    }

    #[test]
    fn test_approve_only_from_pending() {
        let conn = setup_db();
        insert_booking(&conn, &sample_booking("bk-1")).unwrap();

        assert!(mark_approved(&conn, "bk-1", "admin-1", Some("ok"), &now()).unwrap());
        assert!(!mark_approved(&conn, "bk-1", "admin-1", None, &now()).unwrap());
        assert!(!mark_rejected(&conn, "bk-1", "admin-1", "late", None, &now()).unwrap());

        let loaded = get_booking_by_id(&conn, "bk-1").unwrap().unwrap();
        assert_eq!(loaded.status, BookingStatus::Approved);
        assert!(loaded.admin_approval.approved);
        assert_eq!(loaded.admin_approval.approved_by.as_deref(), Some("admin-1"));
        assert_eq!(loaded.admin_approval.notes.as_deref(), Some("ok"));
    }

    #[test]
    fn test_success_then_failure_cannot_regress() {
        let conn = setup_db();
        insert_booking(&conn, &sample_booking("bk-1")).unwrap();
        mark_approved(&conn, "bk-1", "admin-1", None, &now()).unwrap();
        assert!(start_payment(&conn, "bk-1", "TXN-1", &now()).unwrap());

        let pending = [BookingStatus::PaymentPending];
        assert!(complete_advance_payment(&conn, "TXN-1", Some("VAL-1"), &pending, &now()).unwrap());
        assert!(!complete_advance_payment(&conn, "TXN-1", Some("VAL-2"), &pending, &now()).unwrap());
        assert!(!revert_payment(&conn, "TXN-1", &now()).unwrap());
        assert!(!start_payment(&conn, "bk-1", "TXN-2", &now()).unwrap());

        let loaded = get_booking_by_id(&conn, "bk-1").unwrap().unwrap();
        assert_eq!(loaded.status, BookingStatus::PaymentCompleted);
        assert!(loaded.payment.advance_paid);
        assert_eq!(loaded.payment.validation_id.as_deref(), Some("VAL-1"));
        assert!(loaded.vendor_contact_shared);
    }

    #[test]
    fn test_cancel_marks_refund_only_when_paid() {
        let conn = setup_db();
        insert_booking(&conn, &sample_booking("unpaid")).unwrap();
        assert!(mark_cancelled(&conn, "unpaid", CancelledBy::Customer, Some("changed plans"), &now()).unwrap());
        let unpaid = get_booking_by_id(&conn, "unpaid").unwrap().unwrap();
        assert!(!unpaid.cancellation.refund_processed);
        assert_eq!(unpaid.cancellation.refund_amount, 0);
        assert_eq!(unpaid.payment.status, PaymentStatus::Unpaid);

        insert_booking(&conn, &sample_booking("paid")).unwrap();
        mark_approved(&conn, "paid", "admin-1", None, &now()).unwrap();
        start_payment(&conn, "paid", "TXN-P", &now()).unwrap();
        complete_advance_payment(&conn, "TXN-P", None, &[BookingStatus::PaymentPending], &now()).unwrap();
        assert!(mark_cancelled(&conn, "paid", CancelledBy::Admin, None, &now()).unwrap());
        assert!(!mark_cancelled(&conn, "paid", CancelledBy::Admin, None, &now()).unwrap());

        let paid = get_booking_by_id(&conn, "paid").unwrap().unwrap();
        assert_eq!(paid.status, BookingStatus::Cancelled);
        assert!(paid.cancellation.refund_processed);
        assert_eq!(paid.cancellation.refund_amount, paid.pricing.advance_payment);
        assert_eq!(paid.payment.status, PaymentStatus::Refunded);
        assert!(paid.payment.advance_paid);
        assert!(!paid.vendor_contact_shared);
    }

    #[test]
    fn test_list_bookings_filters() {
        let conn = setup_db();
        let mut a = sample_booking("a");
        a.vendor_id = "vendor-a".to_string();
        let mut b = sample_booking("b");
        b.customer_id = "cust-2".to_string();
        insert_booking(&conn, &a).unwrap();
        insert_booking(&conn, &b).unwrap();
        mark_approved(&conn, "b", "admin-1", None, &now()).unwrap();

        let all = list_bookings(&conn, &BookingFilter::default(), 50).unwrap();
        assert_eq!(all.len(), 2);

        let approved = list_bookings(
            &conn,
            &BookingFilter {
                status: Some(BookingStatus::Approved),
                ..Default::default()
            },
            50,
        )
        .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, "b");

        let vendor_a = list_bookings(
            &conn,
            &BookingFilter {
                vendor_id: Some("vendor-a"),
                ..Default::default()
            },
            50,
        )
        .unwrap();
        assert_eq!(vendor_a.len(), 1);
        assert_eq!(vendor_a[0].id, "a");

        let cust_2 = list_bookings(
            &conn,
            &BookingFilter {
                customer_id: Some("cust-2"),
                ..Default::default()
            },
            1,
        )
        .unwrap();
        assert_eq!(cust_2.len(), 1);
    }

    #[test]
    fn test_dashboard_stats_counts() {
        let conn = setup_db();
        insert_booking(&conn, &sample_booking("a")).unwrap();
        insert_booking(&conn, &sample_booking("b")).unwrap();
        mark_approved(&conn, "b", "admin-1", None, &now()).unwrap();
        start_payment(&conn, "b", "TXN-B", &now()).unwrap();
        complete_advance_payment(&conn, "TXN-B", None, &[BookingStatus::PaymentPending], &now()).unwrap();

        let stats = get_dashboard_stats(&conn).unwrap();
        assert_eq!(stats.total_bookings, 2);
        assert_eq!(stats.awaiting_review, 1);
        assert_eq!(stats.advance_collected, 10_000);
        assert_eq!(stats.refunded, 0);

        let vendor = get_vendor_stats(&conn, "vendor-1").unwrap();
        assert_eq!(vendor.total_bookings, 2);
        assert_eq!(vendor.active_bookings, 1);
        assert_eq!(vendor.advance_collected, 10_000);
    }

    #[test]
    fn test_reinitiation_keeps_earlier_attempts() {
        let conn = setup_db();
        insert_booking(&conn, &sample_booking("bk-1")).unwrap();
        mark_approved(&conn, "bk-1", "admin-1", None, &now()).unwrap();
        assert!(start_payment(&conn, "bk-1", "TXN-1", &now()).unwrap());
        assert!(start_payment(&conn, "bk-1", "TXN-2", &now()).unwrap());

        let attempts = list_payment_attempts(&conn, "bk-1").unwrap();
        let ids: Vec<&str> = attempts.iter().map(|a| a.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["TXN-1", "TXN-2"]);
        assert!(attempts.iter().all(|a| a.amount == 10_000 && a.captured_at.is_none()));

        assert!(get_booking_by_transaction(&conn, "TXN-1").unwrap().is_none());
        assert_eq!(get_payment_attempt(&conn, "TXN-1").unwrap().unwrap().booking_id, "bk-1");

        assert!(mark_attempt_captured(&conn, "TXN-1", Some("VAL-1"), &now()).unwrap());
        assert!(!mark_attempt_captured(&conn, "TXN-1", Some("VAL-1"), &now()).unwrap());
        set_attempt_refund_reference(&conn, "TXN-1", "RF-1").unwrap();
        let first = get_payment_attempt(&conn, "TXN-1").unwrap().unwrap();
        assert!(first.captured_at.is_some());
        assert_eq!(first.refund_reference.as_deref(), Some("RF-1"));
    }

    #[test]
    fn test_adopt_attempt_switches_transaction() {
        let conn = setup_db();
        insert_booking(&conn, &sample_booking("bk-1")).unwrap();
        mark_approved(&conn, "bk-1", "admin-1", None, &now()).unwrap();
        start_payment(&conn, "bk-1", "TXN-1", &now()).unwrap();
        start_payment(&conn, "bk-1", "TXN-2", &now()).unwrap();

        let from = [BookingStatus::PaymentPending, BookingStatus::Approved];
        assert!(adopt_attempt(&conn, "bk-1", "TXN-1", Some("VAL-1"), &from, &now()).unwrap());
        assert!(!adopt_attempt(&conn, "bk-1", "TXN-2", None, &from, &now()).unwrap());

        let loaded = get_booking_by_id(&conn, "bk-1").unwrap().unwrap();
        assert_eq!(loaded.status, BookingStatus::PaymentCompleted);
        assert_eq!(loaded.payment.transaction_id.as_deref(), Some("TXN-1"));
        assert_eq!(loaded.payment.validation_id.as_deref(), Some("VAL-1"));
        assert!(loaded.vendor_contact_shared);
    }

    #[test]
    fn test_capture_after_cancel_is_owed_back() {
        let conn = setup_db();
        insert_booking(&conn, &sample_booking("bk-1")).unwrap();
        mark_approved(&conn, "bk-1", "admin-1", None, &now()).unwrap();
        start_payment(&conn, "bk-1", "TXN-1", &now()).unwrap();

        // Not cancelled: nothing to record
        assert!(!record_capture_after_cancel(&conn, "TXN-1", None, &now()).unwrap());

        mark_cancelled(&conn, "bk-1", CancelledBy::Customer, None, &now()).unwrap();
        assert!(record_capture_after_cancel(&conn, "TXN-1", Some("VAL-1"), &now()).unwrap());
        assert!(!record_capture_after_cancel(&conn, "TXN-1", Some("VAL-1"), &now()).unwrap());

        let loaded = get_booking_by_id(&conn, "bk-1").unwrap().unwrap();
        assert_eq!(loaded.status, BookingStatus::Cancelled);
        assert!(loaded.payment.advance_paid);
        assert_eq!(loaded.payment.status, PaymentStatus::Refunded);
        assert!(loaded.cancellation.refund_processed);
        assert_eq!(loaded.cancellation.refund_amount, loaded.pricing.advance_payment);
        assert!(!loaded.vendor_contact_shared);
    }

    #[test]
    fn test_corrupt_feature_snapshot_is_an_error() {
        let conn = setup_db();
        insert_booking(&conn, &sample_booking("bk-1")).unwrap();
        conn.execute(
            "UPDATE bookings SET package_features = 'not json' WHERE id = 'bk-1'",
            [],
        )
        .unwrap();

        let err = get_booking_by_id(&conn, "bk-1").unwrap_err();
        assert!(err.to_string().contains("invalid package features"));
    }
}
