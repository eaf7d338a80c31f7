use serde::Serialize;

use crate::models::{Booking, ServiceListing};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VendorContactView {
    pub company_name: String,
    pub phone: String,
    pub email: String,
    pub offerings: Vec<String>,
}

/// A booking as the customer sees it. `vendor_contact` is only present while
/// the booking discloses contact details.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerBookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub contact_visible: bool,
    pub vendor_contact: Option<VendorContactView>,
}

/// Vendor contact details for `booking`, or None while they must stay hidden.
pub fn vendor_contact(booking: &Booking, listing: Option<&ServiceListing>) -> Option<VendorContactView> {
    if !booking.contact_visible() {
        return None;
    }
    let listing = listing?;
    Some(VendorContactView {
        company_name: listing.company_name.clone(),
        phone: listing.contact.phone.clone(),
        email: listing.contact.email.clone(),
        offerings: listing
            .offerings
            .iter()
            .map(|o| o.name().to_string())
            .collect(),
    })
}

/// A booking as its vendor sees it: the customer's phone and email stay hidden
/// under the same rule that hides the vendor's contact from the customer.
pub fn vendor_view(mut booking: Booking) -> Booking {
    if !booking.contact_visible() {
        booking.customer.phone.clear();
        booking.customer.email.clear();
    }
    booking
}

pub async fn customer_view(state: &AppState, booking: Booking) -> CustomerBookingView {
    let contact_visible = booking.contact_visible();
    if booking.vendor_contact_shared != contact_visible {
        tracing::warn!(
            booking_id = %booking.id,
            status = %booking.status,
            stored = booking.vendor_contact_shared,
            "stored contact flag disagrees with booking state"
        );
    }

    let vendor_contact = if contact_visible {
        match state.catalog.get_service(&booking.service_id).await {
            Ok(listing) => vendor_contact(&booking, listing.as_ref()),
            Err(e) => {
                tracing::error!(error = %e, booking_id = %booking.id, "failed to load vendor contact");
                None
            }
        }
    } else {
        None
    };

    CustomerBookingView {
        booking,
        contact_visible,
        vendor_contact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::queries::test_support::sample_booking;
    use crate::models::{BookingStatus, ServiceAvailability, ServiceOffering, VendorContact};

    fn listing() -> ServiceListing {
        ServiceListing {
            id: "svc-1".to_string(),
            vendor_id: "vendor-1".to_string(),
            company_name: "Shutter Story".to_string(),
            category: "photography".to_string(),
            availability: ServiceAvailability::Available,
            packages: vec![],
            offerings: vec![
                ServiceOffering::Label("Drone shots".to_string()),
                ServiceOffering::Detailed {
                    name: "Album".to_string(),
                    description: None,
                },
            ],
            contact: VendorContact {
                phone: "+8801800000000".to_string(),
                email: "hello@shutterstory.example".to_string(),
            },
        }
    }

    #[test]
    fn test_contact_follows_status() {
        let listing = listing();
        let mut booking = sample_booking("bk-1");

        for status in BookingStatus::ALL {
            booking.status = status;
            let shown = vendor_contact(&booking, Some(&listing)).is_some();
            let expected = matches!(
                status,
                BookingStatus::PaymentCompleted
                    | BookingStatus::Confirmed
                    | BookingStatus::VendorContacted
            );
            assert_eq!(shown, expected, "status {status}");
        }
    }

    #[test]
    fn test_vendor_view_redacts_customer_until_paid() {
        let booking = sample_booking("bk-1");
        let redacted = vendor_view(booking.clone());
        assert!(redacted.customer.phone.is_empty());
        assert!(redacted.customer.email.is_empty());
        assert_eq!(redacted.customer.name, booking.customer.name);

        let mut paid = booking;
        paid.status = BookingStatus::PaymentCompleted;
        let shown = vendor_view(paid);
        assert_eq!(shown.customer.phone, "+8801700000000");
    }

    #[test]
    fn test_cancelled_booking_hides_contact() {
        let mut booking = sample_booking("bk-1");
        booking.status = BookingStatus::Confirmed;
        let contact = vendor_contact(&booking, Some(&listing())).unwrap();
        assert_eq!(contact.phone, "+8801800000000");
        assert_eq!(contact.offerings, vec!["Drone shots", "Album"]);

        booking.cancellation.cancelled = true;
        assert!(vendor_contact(&booking, Some(&listing())).is_none());
    }
}
