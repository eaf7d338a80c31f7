use serde::{Deserialize, Serialize};

/// One entry of the booking activity feed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingEvent {
    pub id: i64,
    pub booking_id: String,
    pub kind: String,
    pub status: String,
    pub detail: String,
    pub created_at: String,
}
