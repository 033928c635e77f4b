//! Scoped listing queries.
//!
//! A listing is a typed list of [`Predicate`]s over a [`ListingSource`]. Both
//! the row query and the count query wrap the same rendered sub-query, so the
//! two can never disagree about which filters apply. Every caller-supplied
//! value is a bound parameter.

use serde::Deserialize;
use sqlx::{postgres::PgRow, FromRow, Postgres, QueryBuilder};
use std::sync::Arc;
use tokio::time::Instant;
use validator::{Validate, ValidationError};

use crate::db::executor::Executor;
use crate::error::StoreError;

use crate::models::{
    ledger::{PaymentSort, SortDirection},
    principal::VisibilityScope,
    subscriber::SubscriberKind,
};
use crate::repositories::common::{escape_like, push_clause};

/// Static description of the table(s) behind one listing type.
#[derive(Debug)]
pub struct ListingSource {
    pub name: &'static str,
    select: &'static str,
    from: &'static str,
    base: Option<&'static str>,
    group_by: Option<&'static str>,
    search_columns: &'static [&'static str],
    owner_column: &'static str,
    trial_column: Option<&'static str>,
    /// Aggregate counting live sessions; only sources that join live data have one.
    active_count: Option<&'static str>,
}

const LIVE_COUNT: &str = "COUNT(a.activity_id) FILTER (WHERE a.hls_end = FALSE)";

pub static LINE_SOURCE: ListingSource = ListingSource {
    name: "lines",
    select: "l.id, l.id AS line_id, l.created_by AS owner_admin_id, l.username, l.password, \
             l.package_id, l.is_trial, l.enabled, l.admin_enabled, l.exp_date AS expires_at, \
             l.forced_country AS allowed_country, l.admin_notes AS notes, l.max_connections, \
             NULL::TEXT AS identifier, r.reseller_dns AS owner_dns",
    from: "lines l \
           LEFT JOIN resellers r ON r.id = l.created_by \
           LEFT JOIN lines_live a ON a.user_id = l.id",
    base: Some("l.is_mag = FALSE AND l.is_e2 = FALSE"),
    group_by: Some("l.id, r.id"),
    search_columns: &["l.username", "l.admin_notes", "l.allowed_ips"],
    owner_column: "l.created_by",
    trial_column: Some("l.is_trial"),
    active_count: Some(LIVE_COUNT),
};

pub static MAG_DEVICE_SOURCE: ListingSource = ListingSource {
    name: "mag_devices",
    select: "d.id, l.id AS line_id, l.created_by AS owner_admin_id, l.username, l.password, \
             l.package_id, l.is_trial, l.enabled, l.admin_enabled, l.exp_date AS expires_at, \
             l.forced_country AS allowed_country, l.admin_notes AS notes, l.max_connections, \
             d.mac AS identifier, r.reseller_dns AS owner_dns",
    from: "mag_devices d \
           INNER JOIN lines l ON l.id = d.line_id \
           LEFT JOIN resellers r ON r.id = l.created_by \
           LEFT JOIN lines_live a ON a.user_id = l.id",
    base: Some("l.is_mag = TRUE"),
    group_by: Some("d.id, l.id, r.id"),
    search_columns: &["l.username", "l.admin_notes", "d.mac"],
    owner_column: "l.created_by",
    trial_column: Some("l.is_trial"),
    active_count: Some(LIVE_COUNT),
};

pub static ENIGMA_DEVICE_SOURCE: ListingSource = ListingSource {
    name: "enigma_devices",
    select: "d.id, l.id AS line_id, l.created_by AS owner_admin_id, l.username, l.password, \
             l.package_id, l.is_trial, l.enabled, l.admin_enabled, l.exp_date AS expires_at, \
             l.forced_country AS allowed_country, l.admin_notes AS notes, l.max_connections, \
             d.mac AS identifier, r.reseller_dns AS owner_dns",
    from: "enigma_devices d \
           INNER JOIN lines l ON l.id = d.line_id \
           LEFT JOIN resellers r ON r.id = l.created_by \
           LEFT JOIN lines_live a ON a.user_id = l.id",
    base: Some("l.is_e2 = TRUE"),
    group_by: Some("d.id, l.id, r.id"),
    search_columns: &["l.username", "l.admin_notes", "d.mac"],
    owner_column: "l.created_by",
    trial_column: Some("l.is_trial"),
    active_count: Some(LIVE_COUNT),
};

pub static LEDGER_SOURCE: ListingSource = ListingSource {
    name: "reseller_ledger",
    select: "e.id, e.reseller_id, e.credit, e.debit, e.notes, e.created_at",
    from: "reseller_ledger e",
    base: None,
    group_by: None,
    search_columns: &["e.notes"],
    owner_column: "e.reseller_id",
    trial_column: None,
    active_count: None,
};

impl SubscriberKind {
    pub fn source(self) -> &'static ListingSource {
        match self {
            SubscriberKind::Line => &LINE_SOURCE,
            SubscriberKind::MagDevice => &MAG_DEVICE_SOURCE,
            SubscriberKind::EnigmaDevice => &ENIGMA_DEVICE_SOURCE,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
/// Caller-selectable filters. Unknown options are not representable.
pub struct ListingFilters {
    #[validate(length(max = 255))]
    pub search: Option<String>,
    pub is_trial: Option<bool>,
    /// `Some(true)`: at least one live connection; `Some(false)`: none.
    pub active_connections: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Validate)]
#[validate(schema(function = "validate_offset_fits"))]
pub struct Pagination {
    #[validate(range(min = 1))]
    pub page: i64,
    #[validate(range(min = 1))]
    pub page_size: i64,
}

impl Pagination {
    /// Row offset of the page, `None` when it does not fit in an `i64`.
    pub fn checked_offset(&self) -> Option<i64> {
        self.page.checked_sub(1)?.checked_mul(self.page_size)
    }

    /// Saturates instead of overflowing; validated paginations never saturate.
    pub fn offset(&self) -> i64 {
        self.checked_offset().unwrap_or(i64::MAX)
    }
}

fn validate_offset_fits(pagination: &Pagination) -> Result<(), ValidationError> {
    match pagination.checked_offset() {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("page_out_of_range")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: &'static str,
    pub direction: SortDirection,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            column: "id",
            direction: SortDirection::Desc,
        }
    }
}

impl From<(PaymentSort, SortDirection)> for SortOrder {
    fn from((sort, direction): (PaymentSort, SortDirection)) -> Self {
        Self {
            column: sort.column(),
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Fixed SQL identifying the entity type. Carries no caller input.
    Base(&'static str),
    /// Case-insensitive substring match over any of the columns.
    Search {
        columns: &'static [&'static str],
        pattern: String,
    },
    OwnerIn {
        column: &'static str,
        owner_ids: Vec<i64>,
    },
    Equals {
        column: &'static str,
        value: BindValue,
    },
}

impl Predicate {
    fn render(&self, builder: &mut QueryBuilder<'static, Postgres>) {
        match self {
            Predicate::Base(sql) => {
                builder.push("(").push(*sql).push(")");
            }
            Predicate::Search { columns, pattern } => {
                builder.push("(");
                for (index, column) in columns.iter().enumerate() {
                    if index > 0 {
                        builder.push(" OR ");
                    }
                    builder
                        .push(*column)
                        .push(" ILIKE ")
                        .push_bind(pattern.clone());
                }
                builder.push(")");
            }
            Predicate::OwnerIn { column, owner_ids } => {
                builder
                    .push(*column)
                    .push(" = ANY(")
                    .push_bind(owner_ids.clone())
                    .push(")");
            }
            Predicate::Equals { column, value } => {
                builder.push(*column).push(" = ");
                match value {
                    BindValue::Bool(v) => builder.push_bind(*v),
                    BindValue::Text(v) => builder.push_bind(v.clone()),
                };
            }
        }
    }
}

/// Post-aggregation filter on the live-connection count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HavingPredicate {
    HasActiveConnections(bool),
}

#[derive(Debug, Clone)]
pub struct ListingQuery {
    source: &'static ListingSource,
    predicates: Vec<Predicate>,
    having: Option<HavingPredicate>,
    order: SortOrder,
    pagination: Pagination,
}

impl ListingQuery {
    /// Composes the predicate list in a fixed order: entity base, search,
    /// visibility scope, trial flag. The live-connection filter is kept apart
    /// because it can only be evaluated after aggregation.
    pub fn build(
        source: &'static ListingSource,
        scope: &VisibilityScope,
        filters: &ListingFilters,
        pagination: Pagination,
        order: SortOrder,
    ) -> Self {
        let mut predicates = Vec::new();

        if let Some(base) = source.base {
            predicates.push(Predicate::Base(base));
        }

        if let Some(term) = filters
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
        {
            predicates.push(Predicate::Search {
                columns: source.search_columns,
                pattern: format!("%{}%", escape_like(term)),
            });
        }

        if !scope.unrestricted {
            predicates.push(Predicate::OwnerIn {
                column: source.owner_column,
                owner_ids: scope.owner_ids.iter().copied().collect(),
            });
        }

        if let (Some(column), Some(is_trial)) = (source.trial_column, filters.is_trial) {
            predicates.push(Predicate::Equals {
                column,
                value: BindValue::Bool(is_trial),
            });
        }

        let having = match (source.active_count, filters.active_connections) {
            (Some(_), Some(active)) => Some(HavingPredicate::HasActiveConnections(active)),
            _ => None,
        };

        Self {
            source,
            predicates,
            having,
            order,
            pagination,
        }
    }

    pub fn source(&self) -> &'static ListingSource {
        self.source
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn having(&self) -> Option<HavingPredicate> {
        self.having
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn push_filtered(&self, builder: &mut QueryBuilder<'static, Postgres>) {
        let source = self.source;
        builder
            .push("SELECT ")
            .push(source.select)
            .push(" FROM ")
            .push(source.from);

        let mut has_clause = false;
        for predicate in &self.predicates {
            push_clause(builder, &mut has_clause);
            predicate.render(builder);
        }

        if let Some(group_by) = source.group_by {
            builder.push(" GROUP BY ").push(group_by);
        }

        if let (Some(count), Some(HavingPredicate::HasActiveConnections(active))) =
            (source.active_count, self.having)
        {
            builder
                .push(" HAVING ")
                .push(count)
                .push(if active { " > 0" } else { " = 0" });
        }
    }

    pub fn row_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT filtered.* FROM (");
        self.push_filtered(&mut builder);
        let direction = self.order.direction.keyword();
        builder.push(") AS filtered ORDER BY filtered.").push(self.order.column);
        builder.push(" ").push(direction);
        if self.order.column != "id" {
            builder.push(", filtered.id ").push(direction);
        }
        builder
            .push(" LIMIT ")
            .push_bind(self.pagination.page_size)
            .push(" OFFSET ")
            .push_bind(self.pagination.offset());
        builder
    }

    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM (");
        self.push_filtered(&mut builder);
        builder.push(") AS filtered");
        builder
    }
}

/// Runs the row query of `query` through the executor.
pub async fn fetch_rows<T>(
    executor: &Executor,
    query: &ListingQuery,
    deadline: Instant,
) -> Result<Vec<T>, StoreError>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
{
    let query = Arc::new(query.clone());
    executor
        .run(deadline, move |conn| {
            let query = Arc::clone(&query);
            Box::pin(async move {
                let mut builder = query.row_query();
                builder.build_query_as::<T>().fetch_all(&mut *conn).await
            })
        })
        .await
}

/// Runs the count query of `query` through the executor.
pub async fn count_rows(
    executor: &Executor,
    query: &ListingQuery,
    deadline: Instant,
) -> Result<i64, StoreError> {
    let query = Arc::new(query.clone());
    executor
        .run(deadline, move |conn| {
            let query = Arc::clone(&query);
            Box::pin(async move {
                let mut builder = query.count_query();
                builder
                    .build_query_scalar::<i64>()
                    .fetch_one(&mut *conn)
                    .await
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn restricted(ids: &[i64]) -> VisibilityScope {
        VisibilityScope {
            owner_ids: ids.iter().copied().collect::<BTreeSet<_>>(),
            unrestricted: false,
        }
    }

    fn unrestricted() -> VisibilityScope {
        VisibilityScope {
            owner_ids: BTreeSet::new(),
            unrestricted: true,
        }
    }

    fn page(page: i64, page_size: i64) -> Pagination {
        Pagination { page, page_size }
    }

    fn inner_sql(sql: &str) -> &str {
        let start = sql.find("FROM (").expect("sub-query start") + "FROM (".len();
        let end = sql.rfind(") AS filtered").expect("sub-query end");
        &sql[start..end]
    }

    #[test]
    fn predicates_follow_base_search_scope_trial_order() {
        let filters = ListingFilters {
            search: Some("bob".into()),
            is_trial: Some(true),
            active_connections: None,
        };
        let query = ListingQuery::build(
            &LINE_SOURCE,
            &restricted(&[5, 6]),
            &filters,
            page(1, 25),
            SortOrder::default(),
        );

        let kinds: Vec<&str> = query
            .predicates()
            .iter()
            .map(|p| match p {
                Predicate::Base(_) => "base",
                Predicate::Search { .. } => "search",
                Predicate::OwnerIn { .. } => "scope",
                Predicate::Equals { .. } => "trial",
            })
            .collect();
        assert_eq!(kinds, vec!["base", "search", "scope", "trial"]);

        let sql = query.row_query().sql().to_string();
        let base = sql.find("l.is_mag = FALSE").expect("base");
        let search = sql.find("l.username ILIKE $1").expect("search");
        let scope = sql.find("l.created_by = ANY($4)").expect("scope");
        let trial = sql.find("l.is_trial = $5").expect("trial");
        assert!(base < search && search < scope && scope < trial);
    }

    #[test]
    fn unrestricted_scope_adds_no_owner_predicate() {
        let query = ListingQuery::build(
            &LINE_SOURCE,
            &unrestricted(),
            &ListingFilters::default(),
            page(1, 10),
            SortOrder::default(),
        );
        assert!(!query
            .predicates()
            .iter()
            .any(|p| matches!(p, Predicate::OwnerIn { .. })));
        assert!(!query.count_query().sql().contains("ANY("));
    }

    #[test]
    fn restricted_scope_binds_exactly_the_visible_owner_ids() {
        let query = ListingQuery::build(
            &MAG_DEVICE_SOURCE,
            &restricted(&[9, 3, 4]),
            &ListingFilters::default(),
            page(1, 10),
            SortOrder::default(),
        );
        let owner_ids = query
            .predicates()
            .iter()
            .find_map(|p| match p {
                Predicate::OwnerIn { owner_ids, .. } => Some(owner_ids.clone()),
                _ => None,
            })
            .expect("scope predicate");
        assert_eq!(owner_ids, vec![3, 4, 9]);
    }

    #[test]
    fn active_filter_is_applied_after_aggregation() {
        let filters = ListingFilters {
            active_connections: Some(true),
            ..ListingFilters::default()
        };
        let query = ListingQuery::build(
            &LINE_SOURCE,
            &restricted(&[1]),
            &filters,
            page(1, 10),
            SortOrder::default(),
        );
        let sql = query.count_query().sql().to_string();
        let where_pos = sql.find(" WHERE ").expect("where");
        let group_pos = sql.find(" GROUP BY ").expect("group by");
        let having_pos = sql.find(" HAVING ").expect("having");
        assert!(where_pos < group_pos && group_pos < having_pos);
        assert!(sql[having_pos..].contains("FILTER (WHERE a.hls_end = FALSE) > 0"));
        assert!(!sql[where_pos..group_pos].contains("hls_end"));

        let none = ListingFilters {
            active_connections: Some(false),
            ..ListingFilters::default()
        };
        let query = ListingQuery::build(
            &LINE_SOURCE,
            &restricted(&[1]),
            &none,
            page(1, 10),
            SortOrder::default(),
        );
        assert!(query.row_query().sql().contains("FILTER (WHERE a.hls_end = FALSE) = 0"));
    }

    #[test]
    fn row_and_count_queries_share_the_filtered_sub_query() {
        let filters = ListingFilters {
            search: Some("abc".into()),
            is_trial: Some(false),
            active_connections: Some(true),
        };
        let query = ListingQuery::build(
            &ENIGMA_DEVICE_SOURCE,
            &restricted(&[2, 8]),
            &filters,
            page(3, 20),
            SortOrder::default(),
        );
        let rows = query.row_query().sql().to_string();
        let count = query.count_query().sql().to_string();
        assert_eq!(inner_sql(&rows), inner_sql(&count));
        assert!(count.starts_with("SELECT COUNT(*) FROM ("));
    }

    #[test]
    fn pagination_uses_one_based_pages() {
        assert_eq!(page(1, 25).offset(), 0);
        assert_eq!(page(3, 25).offset(), 50);
        assert!(page(0, 25).validate().is_err());
        assert!(page(1, 0).validate().is_err());
        // No upper bound at this layer.
        assert!(page(1, 10_000).validate().is_ok());

        let query = ListingQuery::build(
            &LINE_SOURCE,
            &unrestricted(),
            &ListingFilters::default(),
            page(2, 10),
            SortOrder::default(),
        );
        assert!(query
            .row_query()
            .sql()
            .ends_with("ORDER BY filtered.id DESC LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn page_whose_offset_overflows_is_invalid() {
        let extreme = page(i64::MAX, 100);
        assert_eq!(extreme.checked_offset(), None);
        assert_eq!(extreme.offset(), i64::MAX);
        assert!(extreme.validate().is_err());

        let largest = page(i64::MAX / 100 + 1, 100);
        assert_eq!(largest.checked_offset(), Some(i64::MAX / 100 * 100));
        assert!(largest.validate().is_ok());
        assert!(page(i64::MAX / 100 + 2, 100).validate().is_err());
    }

    #[test]
    fn explicit_sort_is_tie_broken_by_id() {
        let query = ListingQuery::build(
            &LEDGER_SOURCE,
            &restricted(&[4]),
            &ListingFilters::default(),
            page(1, 10),
            SortOrder::from((PaymentSort::CreatedAt, SortDirection::Asc)),
        );
        let sql = query.row_query().sql().to_string();
        assert!(sql.contains("ORDER BY filtered.created_at ASC, filtered.id ASC"));
        assert!(sql.contains("e.reseller_id = ANY($1)"));
        assert!(!sql.contains("GROUP BY"));
    }

    #[test]
    fn search_input_never_reaches_the_sql_text() {
        let hostile = "x' OR 1=1; DROP TABLE lines; --";
        let filters = ListingFilters {
            search: Some(hostile.into()),
            ..ListingFilters::default()
        };
        let query = ListingQuery::build(
            &LINE_SOURCE,
            &restricted(&[1]),
            &filters,
            page(1, 10),
            SortOrder::default(),
        );
        let sql = query.row_query().sql().to_string();
        assert!(!sql.contains("DROP TABLE"));
        assert!(!sql.contains("1=1"));
        assert!(query.predicates().iter().any(|p| matches!(
            p,
            Predicate::Search { pattern, .. } if pattern == &format!("%{}%", hostile)
        )));
        // Scope is still applied alongside the search.
        assert!(sql.contains("l.created_by = ANY("));
    }

    #[test]
    fn blank_search_is_ignored() {
        let filters = ListingFilters {
            search: Some("   ".into()),
            ..ListingFilters::default()
        };
        let query = ListingQuery::build(
            &LINE_SOURCE,
            &unrestricted(),
            &filters,
            page(1, 10),
            SortOrder::default(),
        );
        assert_eq!(query.predicates().len(), 1);
    }

    #[test]
    fn trial_filter_is_skipped_for_sources_without_trial_column() {
        let filters = ListingFilters {
            is_trial: Some(true),
            active_connections: Some(true),
            ..ListingFilters::default()
        };
        let query = ListingQuery::build(
            &LEDGER_SOURCE,
            &unrestricted(),
            &filters,
            page(1, 10),
            SortOrder::default(),
        );
        assert!(query.predicates().is_empty());
        assert!(query.having().is_none());
    }
}
