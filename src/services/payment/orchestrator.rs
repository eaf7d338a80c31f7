use std::fmt;

use rusqlite::Connection;
use serde::Serialize;

use super::{
    CallbackUrls, GatewayStatus, GatewayVerdict, PaymentCustomer, PaymentInit,
};
use crate::db::{self, queries};
use crate::errors::BookingError;
use crate::models::{Booking, BookingStatus};
use crate::services::lifecycle::{load_booking, load_for, Actor};
use crate::services::{activity, cancellation, notify};
use crate::state::AppState;

/// Where a payment notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    RedirectSuccess,
    RedirectFail,
    RedirectCancel,
    Ipn,
    Verify,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::RedirectSuccess => "redirect_success",
            Channel::RedirectFail => "redirect_fail",
            Channel::RedirectCancel => "redirect_cancel",
            Channel::Ipn => "ipn",
            Channel::Verify => "verify",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gateway notification, whichever channel delivered it.
#[derive(Debug, Clone)]
pub struct GatewayNotice {
    pub transaction_id: String,
    pub status: GatewayStatus,
    pub validation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The notification changed the booking.
    Applied,
    /// The same effect was already in place.
    Duplicate,
    /// The booking is in a state this notification may not touch.
    Ignored,
    /// The gateway captured money the booking can no longer use; it is owed
    /// back to the customer.
    Refunded,
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub outcome: Outcome,
    pub booking: Booking,
}

#[derive(Debug, Serialize)]
pub struct PaymentStarted {
    pub booking_id: String,
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub redirect_url: String,
}

fn new_transaction_id() -> String {
    format!("TXN-{}", uuid::Uuid::new_v4().simple())
}

/// Finds the booking a transaction belongs to. The flag is false when the id
/// is an earlier checkout that a re-initiation has since replaced.
fn resolve(conn: &Connection, transaction_id: &str) -> Result<(Booking, bool), BookingError> {
    if let Some(booking) = queries::get_booking_by_transaction(conn, transaction_id)? {
        return Ok((booking, true));
    }
    match queries::get_payment_attempt(conn, transaction_id)? {
        Some(attempt) => Ok((load_booking(conn, &attempt.booking_id)?, false)),
        None => Err(BookingError::NotFound),
    }
}

/// Applies the success effect for `transaction_id`. Redirects and the IPN may
/// also confirm a booking that a browser cancel already reverted to
/// `approved`; explicit verification only ever confirms `payment_pending`.
///
/// Money is never dropped on the floor: a capture for a cancelled booking, or
/// a second capture on a superseded checkout, comes back as `Refunded`.
pub fn apply_success(
    conn: &Connection,
    transaction_id: &str,
    validation_id: Option<&str>,
    channel: Channel,
) -> Result<Reconciled, BookingError> {
    let from: &[BookingStatus] = match channel {
        Channel::Verify => &[BookingStatus::PaymentPending],
        _ => &[BookingStatus::PaymentPending, BookingStatus::Approved],
    };
    let at = queries::now();
    let (booking, current) = resolve(conn, transaction_id)?;

    let outcome = if current {
        if queries::complete_advance_payment(conn, transaction_id, validation_id, from, &at)? {
            Outcome::Applied
        } else if channel != Channel::Verify
            && queries::record_capture_after_cancel(conn, transaction_id, validation_id, &at)?
        {
            Outcome::Refunded
        } else if booking.payment.advance_paid {
            Outcome::Duplicate
        } else {
            Outcome::Ignored
        }
    } else if queries::adopt_attempt(conn, &booking.id, transaction_id, validation_id, from, &at)? {
        Outcome::Applied
    } else if booking.payment.advance_paid || booking.cancellation.cancelled {
        if queries::mark_attempt_captured(conn, transaction_id, validation_id, &at)? {
            Outcome::Refunded
        } else {
            Outcome::Duplicate
        }
    } else {
        Outcome::Ignored
    };

    if matches!(outcome, Outcome::Applied | Outcome::Refunded) {
        queries::mark_attempt_captured(conn, transaction_id, validation_id, &at)?;
    }

    let booking = load_booking(conn, &booking.id)?;
    Ok(Reconciled { outcome, booking })
}

/// Reverts `payment_pending` to `approved` so payment can be retried. A paid
/// booking is never touched, and neither is a booking whose checkout has
/// moved on to a newer transaction.
pub fn apply_failure(conn: &Connection, transaction_id: &str) -> Result<Reconciled, BookingError> {
    let (booking, current) = resolve(conn, transaction_id)?;
    if !current {
        return Ok(Reconciled {
            outcome: Outcome::Ignored,
            booking,
        });
    }

    let applied = queries::revert_payment(conn, transaction_id, &queries::now())?;
    let booking = load_booking(conn, &booking.id)?;

    let outcome = if applied {
        Outcome::Applied
    } else if booking.status == BookingStatus::Approved && !booking.payment.advance_paid {
        Outcome::Duplicate
    } else {
        Outcome::Ignored
    };
    Ok(Reconciled { outcome, booking })
}

/// Decides what a notice means for the booking. Redirect endpoints carry their
/// meaning in the URL; the IPN and verification carry it in the status. A
/// success redirect only gets here once the gateway has confirmed it.
fn effect_of(channel: Channel, status: GatewayStatus) -> Option<bool> {
    match channel {
        Channel::RedirectSuccess => Some(true),
        Channel::RedirectFail | Channel::RedirectCancel => Some(false),
        Channel::Ipn | Channel::Verify => match status {
            GatewayStatus::Valid => Some(true),
            GatewayStatus::Failed | GatewayStatus::Cancelled => Some(false),
            GatewayStatus::Unknown => None,
        },
    }
}

pub fn reconcile(
    conn: &Connection,
    channel: Channel,
    notice: &GatewayNotice,
) -> Result<Reconciled, BookingError> {
    match effect_of(channel, notice.status) {
        Some(true) => apply_success(
            conn,
            &notice.transaction_id,
            notice.validation_id.as_deref(),
            channel,
        ),
        Some(false) => apply_failure(conn, &notice.transaction_id),
        None => Ok(Reconciled {
            outcome: Outcome::Ignored,
            booking: resolve(conn, &notice.transaction_id)?.0,
        }),
    }
}

/// Runs `reconcile` and performs the follow-up work for applied changes:
/// activity feed entries and notifications.
pub async fn handle_notice(
    state: &AppState,
    channel: Channel,
    notice: &GatewayNotice,
) -> Result<Reconciled, BookingError> {
    let result = {
        let conn = db::lock(&state.db);
        reconcile(&conn, channel, notice)
    };

    let mut reconciled = match result {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(
                transaction_id = %notice.transaction_id,
                channel = %channel,
                error = %e,
                "payment notification not applied"
            );
            return Err(e);
        }
    };

    let booking = &reconciled.booking;
    tracing::info!(
        booking_id = %booking.id,
        transaction_id = %notice.transaction_id,
        channel = %channel,
        outcome = ?reconciled.outcome,
        status = %booking.status,
        "payment notification reconciled"
    );

    match reconciled.outcome {
        Outcome::Applied if booking.payment.advance_paid => {
            activity::record_booking_event(
                state,
                &booking.id,
                "payment_completed",
                booking.status,
                &format!("advance {} received via {channel}", booking.pricing.advance_payment),
            );
            notify::payment_received(state, booking);
        }
        Outcome::Applied => {
            activity::record_booking_event(
                state,
                &booking.id,
                "payment_reverted",
                booking.status,
                &format!("transaction {} not completed ({channel})", notice.transaction_id),
            );
        }
        Outcome::Refunded => {
            let amount = booking.pricing.advance_payment;
            tracing::warn!(
                booking_id = %booking.id,
                transaction_id = %notice.transaction_id,
                amount,
                "payment captured for a booking that cannot use it"
            );
            activity::record_booking_event(
                state,
                &booking.id,
                "payment_refund_due",
                booking.status,
                &format!(
                    "transaction {} captured via {channel} after the booking moved on",
                    notice.transaction_id
                ),
            );
            let current = booking.payment.transaction_id.as_deref() == Some(notice.transaction_id.as_str());
            let reference =
                cancellation::hand_off_refund(state, booking, &notice.transaction_id, amount).await;
            if let (true, Some(reference)) = (current, reference) {
                reconciled.booking.cancellation.refund_reference = Some(reference);
            }
        }
        Outcome::Duplicate | Outcome::Ignored => {}
    }

    Ok(reconciled)
}

/// The success redirect travels through the customer's browser, so anyone
/// holding the transaction id can post it. The gateway's own record decides;
/// without its confirmation the booking is left alone.
pub async fn confirm_redirect_success(
    state: &AppState,
    notice: &GatewayNotice,
) -> Result<Reconciled, BookingError> {
    let resolved = {
        let conn = db::lock(&state.db);
        resolve(&conn, &notice.transaction_id)
    };
    let booking = match resolved {
        Ok((booking, _)) => booking,
        Err(e) => {
            tracing::warn!(
                transaction_id = %notice.transaction_id,
                error = %e,
                "success redirect for an unknown transaction"
            );
            return Err(e);
        }
    };

    match query_gateway(state, &booking.id, &notice.transaction_id).await {
        GatewayVerdict::Valid { validation_id } => {
            let confirmed = GatewayNotice {
                transaction_id: notice.transaction_id.clone(),
                status: GatewayStatus::Valid,
                validation_id: validation_id.or_else(|| notice.validation_id.clone()),
            };
            handle_notice(state, Channel::RedirectSuccess, &confirmed).await
        }
        verdict => {
            tracing::warn!(
                booking_id = %booking.id,
                transaction_id = %notice.transaction_id,
                posted_status = ?notice.status,
                verdict = ?verdict,
                "success redirect not confirmed by the gateway"
            );
            Ok(Reconciled {
                outcome: Outcome::Ignored,
                booking,
            })
        }
    }
}

/// Asks the gateway for its view of a transaction. Errors and timeouts count
/// as not settled yet.
async fn query_gateway(state: &AppState, booking_id: &str, transaction_id: &str) -> GatewayVerdict {
    match tokio::time::timeout(
        state.config.gateway_timeout(),
        state.gateway.query_transaction(transaction_id),
    )
    .await
    {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            tracing::warn!(booking_id, transaction_id, error = %e, "gateway query failed");
            GatewayVerdict::Pending
        }
        Err(_) => {
            tracing::warn!(booking_id, transaction_id, "gateway query timed out");
            GatewayVerdict::Pending
        }
    }
}

/// Starts a gateway checkout for the advance payment.
///
/// The booking is moved to `payment_pending` with a fresh transaction id
/// before the gateway is contacted, so a timeout or crash leaves a booking
/// that can simply be initiated again.
pub async fn initiate_payment(
    state: &AppState,
    customer_id: &str,
    booking_id: &str,
) -> Result<PaymentStarted, BookingError> {
    let transaction_id = new_transaction_id();

    let booking = {
        let conn = db::lock(&state.db);
        let booking = load_for(&conn, booking_id, Actor::Customer(customer_id))?;
        if booking.payment.advance_paid {
            return Err(BookingError::AlreadyPaid {
                status: booking.status,
            });
        }
        if booking.cancellation.cancelled {
            return Err(BookingError::AlreadyCancelled);
        }
        if !matches!(
            booking.status,
            BookingStatus::Approved | BookingStatus::PaymentPending
        ) {
            return Err(BookingError::NotApprovedYet {
                status: booking.status,
            });
        }

        if !queries::start_payment(&conn, booking_id, &transaction_id, &queries::now())? {
            let current = load_booking(&conn, booking_id)?;
            return Err(if current.payment.advance_paid {
                BookingError::AlreadyPaid {
                    status: current.status,
                }
            } else if current.cancellation.cancelled {
                BookingError::AlreadyCancelled
            } else {
                BookingError::NotApprovedYet {
                    status: current.status,
                }
            });
        }
        load_booking(&conn, booking_id)?
    };

    activity::record_booking_event(
        state,
        booking_id,
        "payment_initiated",
        booking.status,
        &format!("transaction {transaction_id}"),
    );

    let request = PaymentInit {
        transaction_id: transaction_id.clone(),
        amount: booking.pricing.advance_payment,
        currency: state.config.currency.clone(),
        product_name: booking.package.name.clone(),
        product_category: "event-service".to_string(),
        customer: PaymentCustomer {
            name: booking.customer.name.clone(),
            email: booking.customer.email.clone(),
            phone: booking.customer.phone.clone(),
            address: booking.customer.event_address.clone(),
            city: booking.customer.event_city.clone(),
        },
        callbacks: CallbackUrls {
            success: state.config.callback_url("/api/payments/success"),
            fail: state.config.callback_url("/api/payments/fail"),
            cancel: state.config.callback_url("/api/payments/cancel"),
            ipn: state.config.callback_url("/api/payments/ipn"),
        },
    };

    let session = match tokio::time::timeout(
        state.config.gateway_timeout(),
        state.gateway.init_payment(&request),
    )
    .await
    {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => {
            tracing::error!(booking_id, transaction_id = %transaction_id, error = %e, "gateway init failed");
            return Err(BookingError::GatewayInit(
                "payment gateway could not start the checkout".to_string(),
            ));
        }
        Err(_) => {
            tracing::error!(booking_id, transaction_id = %transaction_id, "gateway init timed out");
            return Err(BookingError::GatewayInit(
                "payment gateway did not respond in time".to_string(),
            ));
        }
    };

    if session.redirect_url.trim().is_empty() {
        tracing::error!(booking_id, transaction_id = %transaction_id, "gateway returned no redirect url");
        return Err(BookingError::GatewayInit(
            "payment gateway returned no checkout page".to_string(),
        ));
    }

    tracing::info!(
        booking_id,
        transaction_id = %transaction_id,
        amount = request.amount,
        "payment initiated"
    );

    Ok(PaymentStarted {
        booking_id: booking_id.to_string(),
        transaction_id,
        amount: request.amount,
        currency: request.currency,
        redirect_url: session.redirect_url,
    })
}

/// Client-driven confirmation after the browser returns from the gateway.
/// Only a `payment_pending` booking is checked against the gateway; any other
/// state is returned as it is.
pub async fn verify_payment(
    state: &AppState,
    customer_id: &str,
    booking_id: &str,
    transaction_id: &str,
) -> Result<Reconciled, BookingError> {
    let booking = {
        let conn = db::lock(&state.db);
        load_for(&conn, booking_id, Actor::Customer(customer_id))?
    };
    if booking.payment.transaction_id.as_deref() != Some(transaction_id) {
        return Err(BookingError::NotFound);
    }
    if booking.status != BookingStatus::PaymentPending {
        let outcome = if booking.payment.advance_paid {
            Outcome::Duplicate
        } else {
            Outcome::Ignored
        };
        return Ok(Reconciled { outcome, booking });
    }

    let notice = match query_gateway(state, booking_id, transaction_id).await {
        GatewayVerdict::Valid { validation_id } => GatewayNotice {
            transaction_id: transaction_id.to_string(),
            status: GatewayStatus::Valid,
            validation_id,
        },
        GatewayVerdict::Failed => GatewayNotice {
            transaction_id: transaction_id.to_string(),
            status: GatewayStatus::Failed,
            validation_id: None,
        },
        GatewayVerdict::Pending => {
            return Ok(Reconciled {
                outcome: Outcome::Ignored,
                booking,
            })
        }
    };

    handle_notice(state, Channel::Verify, &notice).await
}
