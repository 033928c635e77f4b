use async_trait::async_trait;

use crate::db::executor::Executor;
use crate::error::StoreError;
use crate::models::login_attempt::LoginEvent;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoginEventStore: Send + Sync {
    async fn record(&self, event: LoginEvent) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgLoginEventStore {
    executor: Executor,
}

impl PgLoginEventStore {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl LoginEventStore for PgLoginEventStore {
    async fn record(&self, event: LoginEvent) -> Result<(), StoreError> {
        self.executor
            .run(self.executor.deadline(), move |conn| {
                let event = event.clone();
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO login_events \
                         (reseller_id, username, source_address, outcome, occurred_at) \
                         VALUES ($1, $2, $3, $4, $5)",
                    )
                    .bind(event.reseller_id)
                    .bind(event.username)
                    .bind(event.source_address)
                    .bind(event.outcome.as_str())
                    .bind(event.occurred_at)
                    .execute(&mut *conn)
                    .await
                    .map(|_| ())
                })
            })
            .await
    }
}
