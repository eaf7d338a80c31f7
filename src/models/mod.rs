pub mod booking;
pub mod customer;
pub mod event;
pub mod payment;
pub mod service;

pub use booking::{
    AdminApproval, Booking, BookingStatus, Cancellation, CancelledBy, CustomerSnapshot,
    PackageSnapshot, PaymentInfo, PaymentStatus, Pricing,
};
pub use customer::Customer;
pub use event::BookingEvent;
pub use payment::PaymentAttempt;
pub use service::{Package, ServiceAvailability, ServiceListing, ServiceOffering, VendorContact};
