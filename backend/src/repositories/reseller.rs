//! Reseller lookups used by the authenticator and the bearer middleware.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::db::executor::Executor;
use crate::error::StoreError;
use crate::models::reseller::Reseller;

macro_rules! select_reseller {
    () => {
        "SELECT id, username, password_digest, display_name, level AS role_level, \
         father AS parent_id, suspend AS suspend_state, member_group_id, reseller_dns, \
         last_login_at, last_login_ip FROM resellers"
    };
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResellerStore: Send + Sync {
    /// Exact, case-sensitive username match.
    async fn find_by_username(&self, username: &str) -> Result<Option<Reseller>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Reseller>, StoreError>;

    /// Ids of resellers whose parent is `parent_id`. Grandchildren are not included.
    async fn direct_subordinate_ids(&self, parent_id: i64) -> Result<BTreeSet<i64>, StoreError>;

    /// Credits minus debits over the reseller's ledger.
    async fn balance(&self, reseller_id: i64) -> Result<i64, StoreError>;

    async fn touch_last_login(
        &self,
        reseller_id: i64,
        at: DateTime<Utc>,
        source_address: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgResellerStore {
    executor: Executor,
}

impl PgResellerStore {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ResellerStore for PgResellerStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Reseller>, StoreError> {
        let username = username.to_string();
        self.executor
            .run(self.executor.deadline(), move |conn| {
                let username = username.clone();
                Box::pin(async move {
                    sqlx::query_as::<_, Reseller>(concat!(
                        select_reseller!(),
                        " WHERE username = $1"
                    ))
                    .bind(username)
                    .fetch_optional(&mut *conn)
                    .await
                })
            })
            .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Reseller>, StoreError> {
        self.executor
            .run(self.executor.deadline(), move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, Reseller>(concat!(select_reseller!(), " WHERE id = $1"))
                        .bind(id)
                        .fetch_optional(&mut *conn)
                        .await
                })
            })
            .await
    }

    async fn direct_subordinate_ids(&self, parent_id: i64) -> Result<BTreeSet<i64>, StoreError> {
        let ids = self
            .executor
            .run(self.executor.deadline(), move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, i64>("SELECT id FROM resellers WHERE father = $1")
                        .bind(parent_id)
                        .fetch_all(&mut *conn)
                        .await
                })
            })
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn balance(&self, reseller_id: i64) -> Result<i64, StoreError> {
        self.executor
            .run(self.executor.deadline(), move |conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, i64>(
                        "SELECT (COALESCE(SUM(credit), 0) - COALESCE(SUM(debit), 0))::BIGINT \
                         FROM reseller_ledger WHERE reseller_id = $1",
                    )
                    .bind(reseller_id)
                    .fetch_one(&mut *conn)
                    .await
                })
            })
            .await
    }

    async fn touch_last_login(
        &self,
        reseller_id: i64,
        at: DateTime<Utc>,
        source_address: &str,
    ) -> Result<(), StoreError> {
        let source_address = source_address.to_string();
        self.executor
            .run(self.executor.deadline(), move |conn| {
                let source_address = source_address.clone();
                Box::pin(async move {
                    sqlx::query(
                        "UPDATE resellers SET last_login_at = $2, last_login_ip = $3 WHERE id = $1",
                    )
                    .bind(reseller_id)
                    .bind(at)
                    .bind(source_address)
                    .execute(&mut *conn)
                    .await
                    .map(|_| ())
                })
            })
            .await
    }
}
