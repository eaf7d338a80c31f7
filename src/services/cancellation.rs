use rusqlite::Connection;

use crate::db::{self, queries};
use crate::errors::BookingError;
use crate::models::{Booking, CancelledBy};
use crate::services::lifecycle::{load_booking, load_for, Actor};
use crate::services::{activity, notify};
use crate::state::AppState;

fn refusal(booking: &Booking) -> BookingError {
    if booking.cancellation.cancelled {
        BookingError::AlreadyCancelled
    } else {
        BookingError::NotCancellable {
            status: booking.status,
        }
    }
}

/// Cancels a booking and, when the advance was paid, marks it for refund.
/// Vendors cannot cancel; they see the booking as missing.
pub fn cancel(
    conn: &Connection,
    booking_id: &str,
    actor: Actor<'_>,
    reason: Option<&str>,
) -> Result<Booking, BookingError> {
    let by = match actor {
        Actor::Admin(_) => CancelledBy::Admin,
        Actor::Customer(_) => CancelledBy::Customer,
        Actor::Vendor(_) => return Err(BookingError::NotFound),
    };

    let booking = load_for(conn, booking_id, actor)?;
    if booking.cancellation.cancelled || !booking.status.is_cancellable() {
        return Err(refusal(&booking));
    }

    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    if !queries::mark_cancelled(conn, booking_id, by, reason, &queries::now())? {
        return Err(refusal(&load_booking(conn, booking_id)?));
    }

    let cancelled = load_booking(conn, booking_id)?;
    tracing::info!(
        booking_id,
        cancelled_by = by.as_str(),
        refund_amount = cancelled.cancellation.refund_amount,
        "booking cancelled"
    );
    Ok(cancelled)
}

/// Hands money owed back to the refund processor and records its reference
/// on the payment attempt, and on the booking when `transaction_id` is the
/// booking's current one. The booking is already marked for refund before
/// this runs, so every failure here is only logged.
pub async fn hand_off_refund(
    state: &AppState,
    booking: &Booking,
    transaction_id: &str,
    amount: i64,
) -> Option<String> {
    let result = match state.refunds.refund(transaction_id, amount).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(
                booking_id = %booking.id,
                transaction_id,
                amount,
                error = %e,
                "refund processor failed, refund stays marked for follow-up"
            );
            return None;
        }
    };

    let current = booking.payment.transaction_id.as_deref() == Some(transaction_id);
    let stored = {
        let conn = db::lock(&state.db);
        let attempt = queries::set_attempt_refund_reference(&conn, transaction_id, &result.reference);
        if current {
            attempt.and(queries::set_refund_reference(&conn, &booking.id, &result.reference))
        } else {
            attempt
        }
    };
    if let Err(e) = stored {
        tracing::error!(
            booking_id = %booking.id,
            transaction_id,
            reference = %result.reference,
            error = %e,
            "refund reference not stored"
        );
    }

    tracing::info!(
        booking_id = %booking.id,
        transaction_id,
        amount,
        reference = %result.reference,
        state = ?result.state,
        "refund handed to processor"
    );
    activity::record_booking_event(
        state,
        &booking.id,
        "refund_requested",
        booking.status,
        &format!("{amount} refund for {transaction_id}, reference {}", result.reference),
    );
    Some(result.reference)
}

/// Cancels, hands any refund to the refund processor, and notifies both
/// parties. Once the cancellation is stored the call succeeds, whatever
/// happens to the refund hand-off.
pub async fn cancel_booking(
    state: &AppState,
    booking_id: &str,
    actor: Actor<'_>,
    reason: Option<&str>,
) -> Result<Booking, BookingError> {
    let mut booking = {
        let conn = db::lock(&state.db);
        cancel(&conn, booking_id, actor, reason)?
    };

    let detail = match booking.cancellation.cancelled_by {
        Some(by) => format!("cancelled by {}", by.as_str()),
        None => "cancelled".to_string(),
    };
    activity::record_booking_event(state, booking_id, "booking_cancelled", booking.status, &detail);

    if booking.cancellation.refund_processed {
        let transaction_id = booking.payment.transaction_id.clone().unwrap_or_default();
        let amount = booking.cancellation.refund_amount;
        if let Some(reference) = hand_off_refund(state, &booking, &transaction_id, amount).await {
            booking.cancellation.refund_reference = Some(reference);
        }
    }

    notify::booking_cancelled(state, &booking);
    Ok(booking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::db::queries::test_support::sample_booking;
    use crate::models::{BookingStatus, PaymentStatus};
    use crate::services::refund::{RefundProcessor, RefundResult, RefundState};
    use crate::state::test_support::test_state;

    fn setup() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn paid(conn: &Connection, id: &str) {
        queries::insert_booking(conn, &sample_booking(id)).unwrap();
        let txn = format!("TXN-{id}");
        queries::mark_approved(conn, id, "admin-1", None, &queries::now()).unwrap();
        queries::start_payment(conn, id, &txn, &queries::now()).unwrap();
        queries::complete_advance_payment(
            conn,
            &txn,
            None,
            &[BookingStatus::PaymentPending],
            &queries::now(),
        )
        .unwrap();
    }

    #[test]
    fn test_cancel_paid_booking_marks_refund() {
        let conn = setup();
        paid(&conn, "bk-1");

        let b = cancel(&conn, "bk-1", Actor::Customer("cust-1"), Some("date moved")).unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
        assert!(b.cancellation.cancelled);
        assert_eq!(b.cancellation.cancelled_by, Some(CancelledBy::Customer));
        assert_eq!(b.cancellation.reason.as_deref(), Some("date moved"));
        assert!(b.cancellation.refund_processed);
        assert_eq!(b.cancellation.refund_amount, b.pricing.advance_payment);
        assert_eq!(b.payment.status, PaymentStatus::Refunded);
        assert!(b.payment.advance_paid);
        assert!(!b.vendor_contact_shared);
        assert!(!b.contact_visible());
    }

    #[test]
    fn test_cancel_unpaid_booking_has_no_refund() {
        let conn = setup();
        queries::insert_booking(&conn, &sample_booking("bk-1")).unwrap();

        let b = cancel(&conn, "bk-1", Actor::Admin("admin-1"), None).unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
        assert_eq!(b.cancellation.cancelled_by, Some(CancelledBy::Admin));
        assert!(!b.cancellation.refund_processed);
        assert_eq!(b.cancellation.refund_amount, 0);
        assert_eq!(b.payment.status, PaymentStatus::Unpaid);

        assert!(matches!(
            cancel(&conn, "bk-1", Actor::Admin("admin-1"), None).unwrap_err(),
            BookingError::AlreadyCancelled
        ));
    }

    #[test]
    fn test_in_progress_and_terminal_not_cancellable() {
        let conn = setup();
        paid(&conn, "busy");
        queries::progress_status(
            &conn,
            "busy",
            BookingStatus::PaymentCompleted,
            BookingStatus::InProgress,
            &queries::now(),
        )
        .unwrap();
        assert!(matches!(
            cancel(&conn, "busy", Actor::Admin("admin-1"), None).unwrap_err(),
            BookingError::NotCancellable {
                status: BookingStatus::InProgress
            }
        ));

        queries::insert_booking(&conn, &sample_booking("rejected")).unwrap();
        queries::mark_rejected(&conn, "rejected", "admin-1", "no", None, &queries::now()).unwrap();
        assert!(matches!(
            cancel(&conn, "rejected", Actor::Customer("cust-1"), None).unwrap_err(),
            BookingError::NotCancellable {
                status: BookingStatus::Rejected
            }
        ));
    }

    #[test]
    fn test_only_owner_or_admin_cancels() {
        let conn = setup();
        queries::insert_booking(&conn, &sample_booking("bk-1")).unwrap();
        assert!(matches!(
            cancel(&conn, "bk-1", Actor::Customer("cust-2"), None).unwrap_err(),
            BookingError::NotFound
        ));
        assert!(matches!(
            cancel(&conn, "bk-1", Actor::Vendor("vendor-1"), None).unwrap_err(),
            BookingError::NotFound
        ));
        assert_eq!(load_booking(&conn, "bk-1").unwrap().status, BookingStatus::Pending);
    }

    struct RecordingRefunds {
        requests: Arc<Mutex<Vec<(String, i64)>>>,
    }

    #[async_trait]
    impl RefundProcessor for RecordingRefunds {
        async fn refund(&self, transaction_id: &str, amount: i64) -> anyhow::Result<RefundResult> {
            self.requests
                .lock()
                .unwrap()
                .push((transaction_id.to_string(), amount));
            Ok(RefundResult {
                reference: format!("RF-{transaction_id}"),
                state: RefundState::Queued,
            })
        }
    }

    #[tokio::test]
    async fn test_unstored_refund_reference_still_cancels() {
        let requests = Arc::new(Mutex::new(vec![]));
        let state = AppState {
            refunds: Box::new(RecordingRefunds {
                requests: Arc::clone(&requests),
            }),
            ..test_state()
        };
        {
            let conn = db::lock(&state.db);
            paid(&conn, "bk-1");
            conn.execute_batch(
                "CREATE TRIGGER refund_reference_locked BEFORE UPDATE OF refund_reference ON bookings
                 BEGIN SELECT RAISE(ABORT, 'refund_reference is locked'); END;",
            )
            .unwrap();
        }

        let booking = cancel_booking(&state, "bk-1", Actor::Customer("cust-1"), None)
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert!(booking.cancellation.refund_processed);
        assert_eq!(*requests.lock().unwrap(), vec![("TXN-bk-1".to_string(), 10_000)]);

        let stored = load_booking(&db::lock(&state.db), "bk-1").unwrap();
        assert!(stored.cancellation.cancelled);
        assert!(stored.cancellation.refund_reference.is_none());
    }
}
