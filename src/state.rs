use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::db::Db;
use crate::models::BookingEvent;
use crate::services::catalog::{CustomerDirectory, ServiceCatalog};
use crate::services::messaging::MessagingProvider;
use crate::services::payment::PaymentGateway;
use crate::services::refund::RefundProcessor;

/// Seams that background notification tasks use are shared through `Arc`.
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub catalog: Arc<dyn ServiceCatalog>,
    pub customers: Box<dyn CustomerDirectory>,
    pub gateway: Box<dyn PaymentGateway>,
    pub refunds: Box<dyn RefundProcessor>,
    pub messaging: Arc<dyn MessagingProvider>,
    pub events_tx: broadcast::Sender<BookingEvent>,
}
