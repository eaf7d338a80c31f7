use std::sync::Arc;

use crate::models::Booking;
use crate::services::catalog::ServiceCatalog;
use crate::services::messaging::MessagingProvider;
use crate::state::AppState;

// Messages are built on the caller's task and delivered on a spawned one.
// Delivery problems are logged and never reach the caller.

pub fn new_request(state: &AppState, booking: &Booking) {
    let message = format!(
        "New booking request for {} on {} in {}. It will be reviewed by our team before payment.",
        booking.package.name, booking.customer.event_date, booking.customer.event_city,
    );
    notify_vendor(state, booking, message);
}

pub fn booking_approved(state: &AppState, booking: &Booking) {
    let pay_link = state
        .config
        .frontend_page(&format!("/bookings/{}/pay", booking.id));
    let customer_message = format!(
        "Your booking for {} on {} is approved. Pay the advance of {} {} to confirm: {}",
        booking.package.name,
        booking.customer.event_date,
        booking.pricing.advance_payment,
        state.config.currency,
        pay_link,
    );
    send(state, &booking.customer.phone, customer_message);

    let vendor_message = format!(
        "Booking {} for {} on {} was approved and is awaiting the customer's advance payment.",
        booking.id, booking.package.name, booking.customer.event_date,
    );
    notify_vendor(state, booking, vendor_message);
}

pub fn booking_rejected(state: &AppState, booking: &Booking) {
    let reason = booking
        .admin_approval
        .rejection_reason
        .as_deref()
        .unwrap_or("not specified");
    let message = format!(
        "Sorry, your booking request for {} on {} was not approved. Reason: {reason}",
        booking.package.name, booking.customer.event_date,
    );
    send(state, &booking.customer.phone, message);
}

pub fn payment_received(state: &AppState, booking: &Booking) {
    let customer_message = format!(
        "We received your advance of {} {} for booking {}. Vendor contact details are now available in your booking.",
        booking.pricing.advance_payment, state.config.currency, booking.id,
    );
    send(state, &booking.customer.phone, customer_message);

    let vendor_message = format!(
        "Advance paid for booking {} ({} on {}). Customer: {}, {}, {}.",
        booking.id,
        booking.package.name,
        booking.customer.event_date,
        booking.customer.name,
        booking.customer.phone,
        booking.customer.email,
    );
    notify_vendor(state, booking, vendor_message);
}

pub fn booking_cancelled(state: &AppState, booking: &Booking) {
    let refund_note = if booking.cancellation.refund_processed {
        format!(
            " A refund of {} {} has been initiated.",
            booking.cancellation.refund_amount, state.config.currency
        )
    } else {
        String::new()
    };
    let message = format!(
        "Booking {} for {} on {} has been cancelled.{refund_note}",
        booking.id, booking.package.name, booking.customer.event_date,
    );
    send(state, &booking.customer.phone, message.clone());
    notify_vendor(state, booking, message);
}

/// The vendor's number comes from the listing, so the lookup happens on the
/// delivery task too.
fn notify_vendor(state: &AppState, booking: &Booking, message: String) {
    let catalog = Arc::clone(&state.catalog);
    let messaging = Arc::clone(&state.messaging);
    let service_id = booking.service_id.clone();

    tokio::spawn(async move {
        let phone = match catalog.get_service(&service_id).await {
            Ok(Some(listing)) => listing.contact.phone,
            Ok(None) => {
                tracing::warn!(service_id = %service_id, "listing missing, vendor not notified");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, service_id = %service_id, "failed to load listing for vendor notification");
                return;
            }
        };
        deliver(messaging.as_ref(), &phone, &message).await;
    });
}

fn send(state: &AppState, to: &str, body: String) {
    let messaging = Arc::clone(&state.messaging);
    let to = to.to_string();
    tokio::spawn(async move {
        deliver(messaging.as_ref(), &to, &body).await;
    });
}

async fn deliver(messaging: &dyn MessagingProvider, to: &str, body: &str) {
    if to.trim().is_empty() {
        tracing::debug!("no phone number on record, skipping notification");
        return;
    }
    if let Err(e) = messaging.send_message(to, body).await {
        tracing::error!(error = %e, to, "failed to send notification");
    }
}
