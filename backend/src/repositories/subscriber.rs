//! Subscriber listings, their live-session samples and the primary server.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::db::executor::Executor;
use crate::error::StoreError;
use crate::models::{
    server::StreamingServer,
    subscriber::{ActiveConnectionSample, SubscriberRecord},
};
use crate::repositories::listing_query::{count_rows, fetch_rows, ListingQuery};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn fetch_rows(
        &self,
        query: &ListingQuery,
        deadline: Instant,
    ) -> Result<Vec<SubscriberRecord>, StoreError>;

    async fn count(&self, query: &ListingQuery, deadline: Instant) -> Result<i64, StoreError>;

    /// Live-session samples for the given lines, ended sessions included.
    async fn connection_samples(
        &self,
        line_ids: Vec<i64>,
        deadline: Instant,
    ) -> Result<Vec<ActiveConnectionSample>, StoreError>;

    async fn primary_server(&self, deadline: Instant) -> Result<Option<StreamingServer>, StoreError>;
}

#[derive(Clone)]
pub struct PgSubscriberStore {
    executor: Executor,
}

impl PgSubscriberStore {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl SubscriberStore for PgSubscriberStore {
    async fn fetch_rows(
        &self,
        query: &ListingQuery,
        deadline: Instant,
    ) -> Result<Vec<SubscriberRecord>, StoreError> {
        fetch_rows(&self.executor, query, deadline).await
    }

    async fn count(&self, query: &ListingQuery, deadline: Instant) -> Result<i64, StoreError> {
        count_rows(&self.executor, query, deadline).await
    }

    async fn connection_samples(
        &self,
        line_ids: Vec<i64>,
        deadline: Instant,
    ) -> Result<Vec<ActiveConnectionSample>, StoreError> {
        if line_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.executor
            .run(deadline, move |conn| {
                let line_ids = line_ids.clone();
                Box::pin(async move {
                    sqlx::query_as::<_, ActiveConnectionSample>(
                        "SELECT user_id AS subscriber_id, user_ip AS source_ip, \
                         geoip_country_code AS geo_country, date_start AS session_started_at, \
                         COALESCE(hls_last_read, 0) AS last_read_at, hls_end AS session_ended, \
                         divergence FROM lines_live WHERE user_id = ANY($1)",
                    )
                    .bind(line_ids)
                    .fetch_all(&mut *conn)
                    .await
                })
            })
            .await
    }

    async fn primary_server(&self, deadline: Instant) -> Result<Option<StreamingServer>, StoreError> {
        self.executor
            .run(deadline, |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, StreamingServer>(
                        "SELECT id, domain_name, server_ip, http_broadcast_port \
                         FROM streaming_servers WHERE is_main = TRUE ORDER BY id LIMIT 1",
                    )
                    .fetch_optional(&mut *conn)
                    .await
                })
            })
            .await
    }
}
