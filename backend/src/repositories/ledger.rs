use async_trait::async_trait;
use tokio::time::Instant;

use crate::db::executor::Executor;
use crate::error::StoreError;
use crate::models::ledger::LedgerEntry;
use crate::repositories::listing_query::{count_rows, fetch_rows, ListingQuery};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn fetch_entries(
        &self,
        query: &ListingQuery,
        deadline: Instant,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn count(&self, query: &ListingQuery, deadline: Instant) -> Result<i64, StoreError>;
}

#[derive(Clone)]
pub struct PgLedgerStore {
    executor: Executor,
}

impl PgLedgerStore {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn fetch_entries(
        &self,
        query: &ListingQuery,
        deadline: Instant,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        fetch_rows(&self.executor, query, deadline).await
    }

    async fn count(&self, query: &ListingQuery, deadline: Instant) -> Result<i64, StoreError> {
        count_rows(&self.executor, query, deadline).await
    }
}
