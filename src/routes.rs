use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        // Customer
        .route(
            "/api/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_bookings),
        )
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/pay",
            post(handlers::bookings::initiate_payment),
        )
        .route(
            "/api/bookings/:id/verify-payment",
            post(handlers::bookings::verify_payment),
        )
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        // Gateway
        .route("/api/payments/success", post(handlers::payments::payment_success))
        .route("/api/payments/fail", post(handlers::payments::payment_fail))
        .route("/api/payments/cancel", post(handlers::payments::payment_cancel))
        .route("/api/payments/ipn", post(handlers::payments::payment_ipn))
        // Admin
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route("/api/admin/bookings/:id", get(handlers::admin::get_booking))
        .route(
            "/api/admin/bookings/:id/approve",
            post(handlers::admin::approve_booking),
        )
        .route(
            "/api/admin/bookings/:id/reject",
            post(handlers::admin::reject_booking),
        )
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/bookings/:id/status",
            post(handlers::admin::update_status),
        )
        .route(
            "/api/admin/bookings/:id/remaining-paid",
            post(handlers::admin::record_remaining_payment),
        )
        .route("/api/admin/stats", get(handlers::admin::get_stats))
        .route("/api/admin/events", get(handlers::admin::events_stream))
        // Vendor
        .route("/api/vendor/bookings", get(handlers::vendor::list_bookings))
        .route("/api/vendor/stats", get(handlers::vendor::get_stats))
        .route(
            "/api/vendor/bookings/:id/status",
            post(handlers::vendor::update_status),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
