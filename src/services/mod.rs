pub mod activity;
pub mod approval;
pub mod cancellation;
pub mod catalog;
pub mod disclosure;
pub mod intake;
pub mod lifecycle;
pub mod messaging;
pub mod notify;
pub mod payment;
pub mod refund;
