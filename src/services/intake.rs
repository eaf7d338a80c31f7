use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::{self, queries};
use crate::errors::BookingError;
use crate::models::{
    AdminApproval, Booking, BookingStatus, Cancellation, CustomerSnapshot, PaymentInfo, Pricing,
    ServiceListing,
};
use crate::services::{activity, notify};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookingRequest {
    pub service_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub event_date: String,
    pub event_address: String,
    pub event_city: String,
    pub package: Option<PackageSelection>,
    pub special_requests: Option<String>,
}

/// The package as the customer saw it when choosing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageSelection {
    pub name: String,
    pub price: i64,
    pub features: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingCreated {
    pub booking_id: String,
    pub status: BookingStatus,
    pub currency: String,
    pub package_price: i64,
    pub advance_payment: i64,
    pub remaining_payment: i64,
    pub total_price: i64,
}

struct ValidatedRequest<'a> {
    event_date: NaiveDate,
    package: &'a PackageSelection,
}

fn validate<'a>(req: &'a BookingRequest, today: NaiveDate) -> Result<ValidatedRequest<'a>, BookingError> {
    let required = [
        ("service_id", &req.service_id),
        ("customer_name", &req.customer_name),
        ("customer_email", &req.customer_email),
        ("customer_phone", &req.customer_phone),
        ("event_date", &req.event_date),
        ("event_address", &req.event_address),
        ("event_city", &req.event_city),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(BookingError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    if !req.customer_email.contains('@') {
        return Err(BookingError::Validation("customer_email is not a valid email".to_string()));
    }

    let event_date = NaiveDate::parse_from_str(req.event_date.trim(), "%Y-%m-%d")
        .map_err(|_| BookingError::Validation("event_date must be YYYY-MM-DD".to_string()))?;
    if event_date < today {
        return Err(BookingError::Validation("event_date is in the past".to_string()));
    }

    let package = req
        .package
        .as_ref()
        .filter(|p| !p.name.trim().is_empty())
        .ok_or_else(|| BookingError::Validation("missing required fields: package".to_string()))?;
    if package.price <= 0 {
        return Err(BookingError::Validation("package price must be positive".to_string()));
    }

    Ok(ValidatedRequest { event_date, package })
}

/// Builds a new pending booking. Package details are copied from the listing
/// and the customer details from the request; neither is consulted again.
pub fn build_booking(
    listing: &ServiceListing,
    customer_id: &str,
    req: &BookingRequest,
    advance_percent: u32,
    now: NaiveDateTime,
) -> Result<Booking, BookingError> {
    let valid = validate(req, now.date())?;

    if !listing.is_bookable() {
        return Err(BookingError::ServiceUnavailable);
    }

    let package = listing.find_package(&valid.package.name).ok_or_else(|| {
        BookingError::Validation(format!(
            "package {:?} is not offered by this service",
            valid.package.name
        ))
    })?;
    if package.price != valid.package.price {
        return Err(BookingError::Validation(format!(
            "package price has changed to {}",
            package.price
        )));
    }

    let pricing = Pricing::from_package_price(package.price, advance_percent).ok_or_else(|| {
        BookingError::Validation(format!("package price {} is out of range", package.price))
    })?;

    Ok(Booking {
        id: uuid::Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        service_id: listing.id.clone(),
        vendor_id: listing.vendor_id.clone(),
        customer: CustomerSnapshot {
            name: req.customer_name.trim().to_string(),
            email: req.customer_email.trim().to_string(),
            phone: req.customer_phone.trim().to_string(),
            event_date: valid.event_date,
            event_address: req.event_address.trim().to_string(),
            event_city: req.event_city.trim().to_string(),
            special_requests: req
                .special_requests
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
        },
        package: package.snapshot(),
        pricing,
        status: BookingStatus::Pending,
        admin_approval: AdminApproval::default(),
        payment: PaymentInfo::default(),
        vendor_contact_shared: false,
        cancellation: Cancellation::default(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn create_booking(
    state: &AppState,
    customer_id: &str,
    req: &BookingRequest,
) -> Result<BookingCreated, BookingError> {
    let now = queries::now();
    validate(req, now.date())?;

    let listing = state
        .catalog
        .get_service(req.service_id.trim())
        .await?
        .ok_or(BookingError::ServiceNotFound)?;
    if !listing.is_bookable() {
        return Err(BookingError::ServiceUnavailable);
    }
    if !state.customers.customer_exists(customer_id).await? {
        return Err(BookingError::CustomerNotFound);
    }

    let booking = build_booking(
        &listing,
        customer_id,
        req,
        state.config.advance_payment_percent,
        now,
    )?;

    {
        let conn = db::lock(&state.db);
        queries::insert_booking(&conn, &booking)?;
    }

    tracing::info!(
        booking_id = %booking.id,
        customer_id,
        service_id = %booking.service_id,
        package_price = booking.pricing.package_price,
        advance_payment = booking.pricing.advance_payment,
        "booking requested"
    );
    activity::record_booking_event(
        state,
        &booking.id,
        "booking_requested",
        booking.status,
        &format!("{} for {}", booking.package.name, booking.customer.event_date),
    );
    notify::new_request(state, &booking);

    Ok(BookingCreated {
        booking_id: booking.id,
        status: booking.status,
        currency: state.config.currency.clone(),
        package_price: booking.pricing.package_price,
        advance_payment: booking.pricing.advance_payment,
        remaining_payment: booking.pricing.remaining_payment,
        total_price: booking.pricing.total_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Package, ServiceAvailability, VendorContact};

    fn listing() -> ServiceListing {
        ServiceListing {
            id: "svc-1".to_string(),
            vendor_id: "vendor-1".to_string(),
            company_name: "Shutter Story".to_string(),
            category: "photography".to_string(),
            availability: ServiceAvailability::Available,
            packages: vec![Package {
                name: "Gold".to_string(),
                price: 100_000,
                features: vec!["8 hours".to_string(), "Album".to_string()],
            }],
            offerings: vec![],
            contact: VendorContact::default(),
        }
    }

    fn request() -> BookingRequest {
        BookingRequest {
            service_id: "svc-1".to_string(),
            customer_name: "Nadia Rahman".to_string(),
            customer_email: "nadia@example.com".to_string(),
            customer_phone: "+8801700000000".to_string(),
            event_date: "2026-12-20".to_string(),
            event_address: "House 12, Road 5".to_string(),
            event_city: "Dhaka".to_string(),
            package: Some(PackageSelection {
                name: "Gold".to_string(),
                price: 100_000,
                features: vec![],
            }),
            special_requests: Some("  ".to_string()),
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_build_booking_prices_and_snapshots() {
        let booking = build_booking(&listing(), "cust-1", &request(), 10, now()).unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.pricing.package_price, 100_000);
        assert_eq!(booking.pricing.advance_payment, 10_000);
        assert_eq!(booking.pricing.remaining_payment, 90_000);
        assert_eq!(booking.pricing.total_price, 100_000);
        assert_eq!(booking.vendor_id, "vendor-1");
        // Features come from the catalog, not from the request
        assert_eq!(booking.package.features, vec!["8 hours", "Album"]);
        assert!(booking.customer.special_requests.is_none());
        assert!(!booking.admin_approval.approved);
        assert!(!booking.vendor_contact_shared);
    }

    #[test]
    fn test_unavailable_listing_refused() {
        let mut closed = listing();
        closed.availability = ServiceAvailability::Unavailable;
        let err = build_booking(&closed, "cust-1", &request(), 10, now()).unwrap_err();
        assert!(matches!(err, BookingError::ServiceUnavailable));
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let mut req = request();
        req.customer_phone = String::new();
        req.event_city = " ".to_string();
        let err = build_booking(&listing(), "cust-1", &req, 10, now()).unwrap_err();
        match err {
            BookingError::Validation(msg) => {
                assert!(msg.contains("customer_phone"));
                assert!(msg.contains("event_city"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let mut req = request();
        req.package = None;
        assert!(matches!(
            build_booking(&listing(), "cust-1", &req, 10, now()).unwrap_err(),
            BookingError::Validation(_)
        ));
    }

    #[test]
    fn test_stale_or_unknown_package_refused() {
        let mut req = request();
        req.package.as_mut().unwrap().price = 80_000;
        assert!(matches!(
            build_booking(&listing(), "cust-1", &req, 10, now()).unwrap_err(),
            BookingError::Validation(_)
        ));

        let mut req = request();
        req.package.as_mut().unwrap().name = "Platinum".to_string();
        assert!(matches!(
            build_booking(&listing(), "cust-1", &req, 10, now()).unwrap_err(),
            BookingError::Validation(_)
        ));
    }

    #[test]
    fn test_overflowing_price_is_a_validation_error() {
        let mut huge = listing();
        huge.packages[0].price = i64::MAX;
        let mut req = request();
        req.package.as_mut().unwrap().price = i64::MAX;
        assert!(matches!(
            build_booking(&huge, "cust-1", &req, 10, now()).unwrap_err(),
            BookingError::Validation(_)
        ));
    }

    #[test]
    fn test_past_event_date_refused() {
        let mut req = request();
        req.event_date = "2026-09-30".to_string();
        assert!(matches!(
            build_booking(&listing(), "cust-1", &req, 10, now()).unwrap_err(),
            BookingError::Validation(_)
        ));
    }
}
