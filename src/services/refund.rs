use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    Queued,
    Completed,
}

#[derive(Debug, Clone)]
pub struct RefundResult {
    pub reference: String,
    pub state: RefundState,
}

/// Moves money back to the customer. Bookings only record that a refund is
/// owed; whatever implements this is responsible for actually paying it.
#[async_trait]
pub trait RefundProcessor: Send + Sync {
    async fn refund(&self, transaction_id: &str, amount: i64) -> anyhow::Result<RefundResult>;
}

/// Queues refunds for finance to settle by hand.
pub struct ManualRefundQueue;

#[async_trait]
impl RefundProcessor for ManualRefundQueue {
    async fn refund(&self, transaction_id: &str, amount: i64) -> anyhow::Result<RefundResult> {
        tracing::warn!(
            transaction_id,
            amount,
            "refund queued for manual settlement"
        );
        Ok(RefundResult {
            reference: format!("MANUAL-{transaction_id}"),
            state: RefundState::Queued,
        })
    }
}
