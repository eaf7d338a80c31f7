use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One gateway checkout opened for a booking. Attempts outlive re-initiation,
/// so money captured on a superseded transaction can still be traced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentAttempt {
    pub transaction_id: String,
    pub booking_id: String,
    pub amount: i64,
    pub created_at: NaiveDateTime,
    pub captured_at: Option<NaiveDateTime>,
    pub validation_id: Option<String>,
    pub refund_reference: Option<String>,
}
