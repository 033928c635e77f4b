use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::executor::Executor;
use crate::error::StoreError;
use crate::models::login_attempt::LoginAttemptRecord;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn find(&self, source_address: &str) -> Result<Option<LoginAttemptRecord>, StoreError>;

    /// Atomically increments the counter for `source_address` (creating it at
    /// one) and moves the lock horizon to `locked_until`.
    async fn record_failure(
        &self,
        username: &str,
        source_address: &str,
        locked_until: DateTime<Utc>,
    ) -> Result<LoginAttemptRecord, StoreError>;

    async fn clear(&self, source_address: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgLoginAttemptStore {
    executor: Executor,
}

impl PgLoginAttemptStore {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl LoginAttemptStore for PgLoginAttemptStore {
    async fn find(&self, source_address: &str) -> Result<Option<LoginAttemptRecord>, StoreError> {
        let source_address = source_address.to_string();
        self.executor
            .run(self.executor.deadline(), move |conn| {
                let source_address = source_address.clone();
                Box::pin(async move {
                    sqlx::query_as::<_, LoginAttemptRecord>(
                        "SELECT source_address, username, attempts AS attempt_count, locked_until \
                         FROM login_attempts WHERE source_address = $1",
                    )
                    .bind(source_address)
                    .fetch_optional(&mut *conn)
                    .await
                })
            })
            .await
    }

    async fn record_failure(
        &self,
        username: &str,
        source_address: &str,
        locked_until: DateTime<Utc>,
    ) -> Result<LoginAttemptRecord, StoreError> {
        let username = username.to_string();
        let source_address = source_address.to_string();
        self.executor
            .run(self.executor.deadline(), move |conn| {
                let username = username.clone();
                let source_address = source_address.clone();
                Box::pin(async move {
                    sqlx::query_as::<_, LoginAttemptRecord>(
                        "INSERT INTO login_attempts (source_address, username, attempts, locked_until) \
                         VALUES ($1, $2, 1, $3) \
                         ON CONFLICT (source_address) DO UPDATE SET \
                         attempts = login_attempts.attempts + 1, \
                         username = EXCLUDED.username, \
                         locked_until = EXCLUDED.locked_until \
                         RETURNING source_address, username, attempts AS attempt_count, locked_until",
                    )
                    .bind(source_address)
                    .bind(username)
                    .bind(locked_until)
                    .fetch_one(&mut *conn)
                    .await
                })
            })
            .await
    }

    async fn clear(&self, source_address: &str) -> Result<(), StoreError> {
        let source_address = source_address.to_string();
        self.executor
            .run(self.executor.deadline(), move |conn| {
                let source_address = source_address.clone();
                Box::pin(async move {
                    sqlx::query("DELETE FROM login_attempts WHERE source_address = $1")
                        .bind(source_address)
                        .execute(&mut *conn)
                        .await
                        .map(|_| ())
                })
            })
            .await
    }
}
