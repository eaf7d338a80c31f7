use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::config::AppConfig;
use crate::errors::BookingError;
use crate::services::payment::orchestrator::{self, Channel, GatewayNotice, Reconciled};
use crate::services::payment::GatewayStatus;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// HMAC-SHA1 over the notification URL followed by every parameter, sorted by
/// name, as `name` + `value`. Compared as base64.
pub fn validate_gateway_signature(
    secret: &str,
    signature: &str,
    url: &str,
    params: &HashMap<String, String>,
) -> bool {
    let mut data = url.to_string();
    let mut sorted: Vec<(&String, &String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in sorted {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match Hmac::<Sha1>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data.as_bytes());
    let signature = match base64::engine::general_purpose::STANDARD.decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    mac.verify_slice(&signature).is_ok()
}

fn field<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn notice_from(params: &HashMap<String, String>) -> Option<GatewayNotice> {
    let transaction_id = field(params, "tran_id")?;
    Some(GatewayNotice {
        transaction_id: transaction_id.to_string(),
        status: field(params, "status")
            .map(GatewayStatus::parse)
            .unwrap_or(GatewayStatus::Unknown),
        validation_id: field(params, "val_id").map(|v| v.to_string()),
    })
}

fn fail_page(config: &AppConfig, reason: &str, booking_id: Option<&str>) -> Redirect {
    let url = match booking_id {
        Some(id) => config.frontend_page(&format!("/payment/fail?reason={reason}&booking={id}")),
        None => config.frontend_page(&format!("/payment/fail?reason={reason}")),
    };
    Redirect::to(&url)
}

/// Where the customer's browser lands once the notification is processed.
/// The page reflects the booking's final state, not the channel it came from.
fn landing_page(
    config: &AppConfig,
    channel: Channel,
    result: Result<Reconciled, BookingError>,
) -> Redirect {
    let reconciled = match result {
        Ok(r) => r,
        Err(BookingError::NotFound) => return fail_page(config, "booking_not_found", None),
        Err(_) => return fail_page(config, "internal_error", None),
    };

    let booking = &reconciled.booking;
    if booking.payment.advance_paid && !booking.cancellation.cancelled {
        let url = config.frontend_page(&format!("/payment/success?booking={}", booking.id));
        return Redirect::to(&url);
    }

    let reason = match channel {
        Channel::RedirectCancel => "payment_cancelled",
        Channel::RedirectSuccess if booking.cancellation.cancelled => "booking_cancelled",
        Channel::RedirectSuccess => "payment_not_confirmed",
        _ => "payment_failed",
    };
    fail_page(config, reason, Some(&booking.id))
}

async fn handle_redirect(
    state: &AppState,
    channel: Channel,
    params: &HashMap<String, String>,
) -> Redirect {
    let Some(notice) = notice_from(params) else {
        tracing::warn!(channel = %channel, "gateway redirect without tran_id");
        return fail_page(&state.config, "booking_not_found", None);
    };

    let result = match channel {
        Channel::RedirectSuccess => orchestrator::confirm_redirect_success(state, &notice).await,
        _ => orchestrator::handle_notice(state, channel, &notice).await,
    };
    landing_page(&state.config, channel, result)
}

// POST /api/payments/success
pub async fn payment_success(
    State(state): State<Arc<AppState>>,
    Form(params): Form<HashMap<String, String>>,
) -> Redirect {
    handle_redirect(&state, Channel::RedirectSuccess, &params).await
}

// POST /api/payments/fail
pub async fn payment_fail(
    State(state): State<Arc<AppState>>,
    Form(params): Form<HashMap<String, String>>,
) -> Redirect {
    handle_redirect(&state, Channel::RedirectFail, &params).await
}

// POST /api/payments/cancel
pub async fn payment_cancel(
    State(state): State<Arc<AppState>>,
    Form(params): Form<HashMap<String, String>>,
) -> Redirect {
    handle_redirect(&state, Channel::RedirectCancel, &params).await
}

fn ipn_ack() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "received"}))).into_response()
}

// POST /api/payments/ipn
pub async fn payment_ipn(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    // Signature check is skipped when no secret is configured (dev mode)
    if !state.config.gateway_ipn_secret.is_empty() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let url = state.config.callback_url("/api/payments/ipn");

        if signature.is_empty()
            || !validate_gateway_signature(&state.config.gateway_ipn_secret, signature, &url, &params)
        {
            tracing::warn!(
                tran_id = field(&params, "tran_id").unwrap_or(""),
                "rejected IPN with invalid signature"
            );
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let Some(notice) = notice_from(&params) else {
        tracing::warn!("IPN without tran_id");
        return ipn_ack();
    };

    tracing::info!(
        transaction_id = %notice.transaction_id,
        status = ?notice.status,
        "IPN received"
    );

    // Outcome is already logged by the orchestrator; the gateway only needs
    // to know the notification arrived.
    let _ = orchestrator::handle_notice(&state, Channel::Ipn, &notice).await;
    ipn_ack()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, url: &str, params: &[(&str, &str)]) -> String {
        let mut data = url.to_string();
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (k, v) in sorted {
            data.push_str(k);
            data.push_str(v);
        }
        let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(data.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_signature_round_trip_and_tamper() {
        let url = "https://api.example.com/api/payments/ipn";
        let pairs = [("tran_id", "TXN-1"), ("status", "VALID"), ("val_id", "V1")];
        let sig = sign("secret", url, &pairs);

        assert!(validate_gateway_signature("secret", &sig, url, &params(&pairs)));
        assert!(!validate_gateway_signature("other", &sig, url, &params(&pairs)));

        let tampered = [("tran_id", "TXN-1"), ("status", "VALID"), ("val_id", "V2")];
        assert!(!validate_gateway_signature("secret", &sig, url, &params(&tampered)));
        assert!(!validate_gateway_signature("secret", "not base64!", url, &params(&pairs)));
    }

    #[test]
    fn test_notice_from_form() {
        let notice = notice_from(&params(&[
            ("tran_id", " TXN-9 "),
            ("status", "VALIDATED"),
            ("val_id", ""),
        ]))
        .unwrap();
        assert_eq!(notice.transaction_id, "TXN-9");
        assert_eq!(notice.status, GatewayStatus::Valid);
        assert!(notice.validation_id.is_none());

        assert!(notice_from(&params(&[("status", "VALID")])).is_none());
    }
}
