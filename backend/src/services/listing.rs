//! Scoped subscriber and payment listings.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use validator::Validate;

use crate::error::ListingError;
use crate::models::{
    ledger::{LedgerEntry, PaymentSort, SortDirection},
    page::Page,
    principal::Principal,
    server::OutputFormat,
    subscriber::{ActiveConnectionSample, DerivedRow, SubscriberKind},
};
use crate::repositories::{
    ledger::LedgerStore,
    listing_query::{ListingFilters, ListingQuery, Pagination, SortOrder, LEDGER_SOURCE},
    subscriber::SubscriberStore,
};
use crate::services::{
    hierarchy::scope_for,
    metrics::{derive_row, LinkContext},
};
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct ListingService {
    subscribers: Arc<dyn SubscriberStore>,
    ledger: Arc<dyn LedgerStore>,
    output_formats: Arc<Vec<OutputFormat>>,
    call_deadline: Duration,
    clock: Arc<dyn Clock>,
}

impl ListingService {
    pub fn new(
        subscribers: Arc<dyn SubscriberStore>,
        ledger: Arc<dyn LedgerStore>,
        output_formats: Vec<OutputFormat>,
        call_deadline: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscribers,
            ledger,
            output_formats: Arc::new(output_formats),
            call_deadline,
            clock,
        }
    }

    /// One page of subscribers of `kind` visible to `principal`, with runtime
    /// fields derived at read time. Every store call shares one deadline.
    pub async fn list_subscribers(
        &self,
        principal: &Principal,
        kind: SubscriberKind,
        pagination: Pagination,
        filters: ListingFilters,
    ) -> Result<Page<DerivedRow>, ListingError> {
        pagination.validate()?;
        filters.validate()?;

        let deadline = Instant::now() + self.call_deadline;
        let scope = scope_for(principal);
        let query = ListingQuery::build(
            kind.source(),
            &scope,
            &filters,
            pagination,
            SortOrder::default(),
        );

        let (records, total_count, primary_server) = tokio::try_join!(
            self.subscribers.fetch_rows(&query, deadline),
            self.subscribers.count(&query, deadline),
            self.subscribers.primary_server(deadline),
        )?;

        let line_ids: BTreeSet<i64> = records.iter().map(|record| record.line_id).collect();
        let samples = self
            .subscribers
            .connection_samples(line_ids.into_iter().collect(), deadline)
            .await?;

        let mut by_line: HashMap<i64, Vec<&ActiveConnectionSample>> = HashMap::new();
        for sample in &samples {
            by_line.entry(sample.subscriber_id).or_default().push(sample);
        }

        let context = LinkContext {
            primary_server: primary_server.as_ref(),
            output_formats: self.output_formats.as_slice(),
        };
        let now = self.clock.now();
        let rows: Vec<DerivedRow> = records
            .into_iter()
            .map(|record| {
                let samples = by_line
                    .get(&record.line_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                derive_row(record, samples, &context, now)
            })
            .collect();

        tracing::debug!(
            kind = kind.as_str(),
            principal_id = principal.id,
            unrestricted = scope.unrestricted,
            rows = rows.len(),
            total_count,
            "subscriber listing served"
        );

        Ok(Page {
            rows,
            total_count,
            page: pagination.page,
            page_size: pagination.page_size,
        })
    }

    /// Ledger entries of the visible resellers, ordered by `sort` with `id` as
    /// tie-breaker.
    pub async fn list_payments(
        &self,
        principal: &Principal,
        pagination: Pagination,
        search: Option<String>,
        sort: PaymentSort,
        direction: SortDirection,
    ) -> Result<Page<LedgerEntry>, ListingError> {
        let filters = ListingFilters {
            search,
            ..ListingFilters::default()
        };
        pagination.validate()?;
        filters.validate()?;

        let deadline = Instant::now() + self.call_deadline;
        let scope = scope_for(principal);
        let query = ListingQuery::build(
            &LEDGER_SOURCE,
            &scope,
            &filters,
            pagination,
            SortOrder::from((sort, direction)),
        );

        let (rows, total_count) = tokio::try_join!(
            self.ledger.fetch_entries(&query, deadline),
            self.ledger.count(&query, deadline)
        )?;

        Ok(Page {
            rows,
            total_count,
            page: pagination.page,
            page_size: pagination.page_size,
        })
    }
}
