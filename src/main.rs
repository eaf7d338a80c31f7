use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::http::HeaderValue;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use eventbook::config::AppConfig;
use eventbook::db;
use eventbook::routes;
use eventbook::services::catalog::SqliteCatalog;
use eventbook::services::messaging::twilio::TwilioSmsProvider;
use eventbook::services::payment::sslcommerz::SslCommerzGateway;
use eventbook::services::refund::ManualRefundQueue;
use eventbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    anyhow::ensure!(!config.admin_token.is_empty(), "ADMIN_TOKEN must not be empty");

    let conn = db::init_db(&config.database_url)?;
    let db: db::Db = Arc::new(Mutex::new(conn));

    if config.gateway_store_id.is_empty() {
        tracing::warn!("GATEWAY_STORE_ID is not set, payment initiation will fail");
    }
    if config.gateway_ipn_secret.is_empty() {
        tracing::warn!("GATEWAY_IPN_SECRET is not set, IPN signatures are not checked");
    }
    tracing::info!(
        gateway = %config.gateway_base_url,
        advance_percent = config.advance_payment_percent,
        currency = %config.currency,
        "payment settings"
    );

    let gateway = SslCommerzGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_store_id.clone(),
        config.gateway_store_password.clone(),
        config.gateway_timeout(),
    )?;
    let messaging = TwilioSmsProvider::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_phone_number.clone(),
    )?;
    if !messaging.is_configured() {
        tracing::info!("Twilio not configured, notifications will only be logged");
    }

    let (events_tx, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        db: db.clone(),
        config: config.clone(),
        catalog: Arc::new(SqliteCatalog::new(db.clone())),
        customers: Box::new(SqliteCatalog::new(db)),
        gateway: Box::new(gateway),
        refunds: Box::new(ManualRefundQueue),
        messaging: Arc::new(messaging),
        events_tx,
    });

    let frontend_origin: HeaderValue = config
        .frontend_url
        .trim_end_matches('/')
        .parse()
        .context("FRONTEND_URL is not a valid origin")?;
    let cors = CorsLayer::new()
        .allow_origin(frontend_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::app(state).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
