use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    /// Base URL the gateway uses to reach our callback and IPN endpoints.
    pub public_base_url: String,
    /// Customer-facing site the browser lands on after a gateway redirect.
    pub frontend_url: String,
    pub advance_payment_percent: u32,
    pub currency: String,
    pub gateway_base_url: String,
    pub gateway_store_id: String,
    pub gateway_store_password: String,
    pub gateway_ipn_secret: String,
    pub gateway_timeout_secs: u64,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "eventbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            advance_payment_percent: env::var("ADVANCE_PAYMENT_PERCENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|p| *p <= 100)
                .unwrap_or(10),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "BDT".to_string()),
            gateway_base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.sslcommerz.com".to_string()),
            gateway_store_id: env::var("GATEWAY_STORE_ID").unwrap_or_default(),
            gateway_store_password: env::var("GATEWAY_STORE_PASSWORD").unwrap_or_default(),
            gateway_ipn_secret: env::var("GATEWAY_IPN_SECRET").unwrap_or_default(),
            gateway_timeout_secs: env::var("GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs.max(1))
    }

    pub fn callback_url(&self, path: &str) -> String {
        format!("{}{}", self.public_base_url.trim_end_matches('/'), path)
    }

    pub fn frontend_page(&self, path: &str) -> String {
        format!("{}{}", self.frontend_url.trim_end_matches('/'), path)
    }
}
