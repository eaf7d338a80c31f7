use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub service_id: String,
    pub vendor_id: String,
    pub customer: CustomerSnapshot,
    pub package: PackageSnapshot,
    pub pricing: Pricing,
    pub status: BookingStatus,
    pub admin_approval: AdminApproval,
    pub payment: PaymentInfo,
    pub vendor_contact_shared: bool,
    pub cancellation: Cancellation,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Whether vendor contact details may be shown, derived from current state.
    pub fn contact_visible(&self) -> bool {
        self.status.discloses_contact() && !self.cancellation.cancelled
    }
}

/// Customer details copied when the booking is made. Later profile edits never
/// reach a historical booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerSnapshot {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub event_date: NaiveDate,
    pub event_address: String,
    pub event_city: String,
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageSnapshot {
    pub name: String,
    pub price: i64,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pricing {
    pub package_price: i64,
    pub advance_payment: i64,
    pub remaining_payment: i64,
    pub total_price: i64,
}

impl Pricing {
    /// Splits a package price into advance and remainder. The advance is
    /// rounded half-up to a whole currency unit. `None` when the price is too
    /// large to split.
    pub fn from_package_price(package_price: i64, advance_percent: u32) -> Option<Self> {
        let advance_payment = package_price
            .checked_mul(i64::from(advance_percent))?
            .checked_add(50)?
            / 100;
        Some(Self {
            package_price,
            advance_payment,
            remaining_payment: package_price.checked_sub(advance_payment)?,
            total_price: package_price,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    PaymentPending,
    PaymentCompleted,
    Confirmed,
    VendorContacted,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 10] = [
        BookingStatus::Pending,
        BookingStatus::Approved,
        BookingStatus::Rejected,
        BookingStatus::PaymentPending,
        BookingStatus::PaymentCompleted,
        BookingStatus::Confirmed,
        BookingStatus::VendorContacted,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::PaymentPending => "payment_pending",
            BookingStatus::PaymentCompleted => "payment_completed",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::VendorContacted => "vendor_contacted",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Completed | BookingStatus::Cancelled
        )
    }

    pub fn discloses_contact(&self) -> bool {
        matches!(
            self,
            BookingStatus::PaymentCompleted
                | BookingStatus::Confirmed
                | BookingStatus::VendorContacted
        )
    }

    pub fn is_cancellable(&self) -> bool {
        !self.is_terminal() && *self != BookingStatus::InProgress
    }

    /// Position along the fulfilment track, for statuses reached after payment.
    fn fulfilment_rank(&self) -> Option<u8> {
        match self {
            BookingStatus::PaymentCompleted => Some(0),
            BookingStatus::Confirmed => Some(1),
            BookingStatus::VendorContacted => Some(2),
            BookingStatus::InProgress => Some(3),
            BookingStatus::Completed => Some(4),
            _ => None,
        }
    }

    /// Fulfilment only ever moves forward, and only once the advance is paid.
    pub fn can_progress_to(&self, target: BookingStatus) -> bool {
        match (self.fulfilment_rank(), target.fulfilment_rank()) {
            (Some(from), Some(to)) => to > from && target != BookingStatus::PaymentCompleted,
            _ => false,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AdminApproval {
    pub approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentInfo {
    pub transaction_id: Option<String>,
    pub advance_paid: bool,
    pub advance_paid_at: Option<NaiveDateTime>,
    pub remaining_paid: bool,
    pub remaining_paid_at: Option<NaiveDateTime>,
    pub status: PaymentStatus,
    pub validation_id: Option<String>,
}

impl Default for PaymentInfo {
    fn default() -> Self {
        Self {
            transaction_id: None,
            advance_paid: false,
            advance_paid_at: None,
            remaining_paid: false,
            remaining_paid_at: None,
            status: PaymentStatus::Unpaid,
            validation_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    AdvancePaid,
    FullyPaid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::AdvancePaid => "advance_paid",
            PaymentStatus::FullyPaid => "fully_paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "advance_paid" => Some(PaymentStatus::AdvancePaid),
            "fully_paid" => Some(PaymentStatus::FullyPaid),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Cancellation {
    pub cancelled: bool,
    pub cancelled_by: Option<CancelledBy>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub reason: Option<String>,
    pub refund_processed: bool,
    pub refund_amount: i64,
    pub refund_reference: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Customer,
    Admin,
}

impl CancelledBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelledBy::Customer => "customer",
            CancelledBy::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(CancelledBy::Customer),
            "admin" => Some(CancelledBy::Admin),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_ten_percent() {
        let p = Pricing::from_package_price(100_000, 10).unwrap();
        assert_eq!(p.advance_payment, 10_000);
        assert_eq!(p.remaining_payment, 90_000);
        assert_eq!(p.total_price, 100_000);
    }

    #[test]
    fn test_pricing_rounds_half_up_and_sums() {
        let p = Pricing::from_package_price(12_345, 5).unwrap();
        // 617.25 rounds to 617
        assert_eq!(p.advance_payment, 617);
        assert_eq!(p.advance_payment + p.remaining_payment, p.total_price);

        let p = Pricing::from_package_price(30, 5).unwrap();
        // 1.5 rounds up
        assert_eq!(p.advance_payment, 2);
        assert_eq!(p.remaining_payment, 28);
    }

    #[test]
    fn test_pricing_refuses_overflowing_price() {
        assert!(Pricing::from_package_price(i64::MAX, 10).is_none());
        assert!(Pricing::from_package_price(i64::MAX / 100, 100).is_some());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in BookingStatus::ALL {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("bogus"), None);
    }

    #[test]
    fn test_progress_is_forward_only() {
        use BookingStatus::*;
        assert!(PaymentCompleted.can_progress_to(Confirmed));
        assert!(Confirmed.can_progress_to(InProgress));
        assert!(InProgress.can_progress_to(Completed));
        assert!(!Completed.can_progress_to(InProgress));
        assert!(!Confirmed.can_progress_to(PaymentCompleted));
        assert!(!Approved.can_progress_to(Confirmed));
        assert!(!PaymentPending.can_progress_to(Completed));
        assert!(!Confirmed.can_progress_to(Cancelled));
    }

    #[test]
    fn test_cancellable_states() {
        use BookingStatus::*;
        for status in [Pending, Approved, PaymentPending, PaymentCompleted, Confirmed, VendorContacted] {
            assert!(status.is_cancellable(), "{status} should be cancellable");
        }
        for status in [Rejected, InProgress, Completed, Cancelled] {
            assert!(!status.is_cancellable(), "{status} should not be cancellable");
        }
    }
}
