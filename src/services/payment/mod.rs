pub mod orchestrator;
pub mod sslcommerz;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything the hosted checkout needs to open a payment page.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInit {
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub product_name: String,
    pub product_category: String,
    pub customer: PaymentCustomer,
    pub callbacks: CallbackUrls,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentCustomer {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackUrls {
    pub success: String,
    pub fail: String,
    pub cancel: String,
    pub ipn: String,
}

#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub redirect_url: String,
    pub session_key: Option<String>,
}

/// The gateway's own view of a transaction, from its query API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayVerdict {
    Valid { validation_id: Option<String> },
    Failed,
    Pending,
}

/// Status field carried by redirect and IPN notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayStatus {
    Valid,
    Failed,
    Cancelled,
    Unknown,
}

impl GatewayStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "VALID" | "VALIDATED" | "SUCCESS" => GatewayStatus::Valid,
            "FAILED" | "EXPIRED" | "UNATTEMPTED" => GatewayStatus::Failed,
            "CANCELLED" | "CANCELED" => GatewayStatus::Cancelled,
            _ => GatewayStatus::Unknown,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn init_payment(&self, request: &PaymentInit) -> anyhow::Result<GatewaySession>;

    async fn query_transaction(&self, transaction_id: &str) -> anyhow::Result<GatewayVerdict>;
}
