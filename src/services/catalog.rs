use async_trait::async_trait;

use crate::db::{self, catalog, Db};
use crate::models::ServiceListing;

/// Source of vendor listings, consulted at booking time and when revealing
/// vendor contact details.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn get_service(&self, id: &str) -> anyhow::Result<Option<ServiceListing>>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer_exists(&self, id: &str) -> anyhow::Result<bool>;
}

/// Catalog and customer directory backed by the local `services` and
/// `customers` tables.
pub struct SqliteCatalog {
    db: Db,
}

impl SqliteCatalog {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ServiceCatalog for SqliteCatalog {
    async fn get_service(&self, id: &str) -> anyhow::Result<Option<ServiceListing>> {
        let conn = db::lock(&self.db);
        catalog::get_service(&conn, id)
    }
}

#[async_trait]
impl CustomerDirectory for SqliteCatalog {
    async fn customer_exists(&self, id: &str) -> anyhow::Result<bool> {
        let conn = db::lock(&self.db);
        Ok(catalog::get_customer(&conn, id)?.is_some())
    }
}
