use crate::db::{self, queries};
use crate::models::{BookingEvent, BookingStatus};
use crate::state::AppState;

/// Appends to the booking activity feed and pushes the entry to live admin
/// subscribers. Failures are logged; the feed never blocks a transition.
pub fn record_booking_event(
    state: &AppState,
    booking_id: &str,
    kind: &str,
    status: BookingStatus,
    detail: &str,
) {
    let event_id = {
        let conn = db::lock(&state.db);
        queries::insert_booking_event(&conn, booking_id, kind, status.as_str(), detail)
    };

    match event_id {
        Ok(id) => {
            let event = BookingEvent {
                id,
                booking_id: booking_id.to_string(),
                kind: kind.to_string(),
                status: status.as_str().to_string(),
                detail: detail.to_string(),
                created_at: queries::format_ts(&queries::now()),
            };
            // No subscribers is fine
            let _ = state.events_tx.send(event);
        }
        Err(e) => {
            tracing::error!(error = %e, booking_id, kind, "failed to record booking event");
        }
    }
}
