use axum::{
    extract::{Extension, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::{
        ledger::{LedgerEntry, PaymentSort, SortDirection},
        page::Page,
        principal::Principal,
        subscriber::{DerivedRow, SubscriberKind},
    },
    repositories::listing_query::{ListingFilters, Pagination},
    state::AppState,
};

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PER_PAGE: i64 = 25;
const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct SubscriberListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    /// `1` trial only, `0` paid only.
    pub is_trial: Option<u8>,
    /// `1` with live connections, `0` without.
    pub active_connections: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub sort: Option<PaymentSort>,
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub items: Vec<T>,
}

impl<T> From<Page<T>> for ListResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            page: page.page,
            per_page: page.page_size,
            total: page.total_count,
            items: page.rows,
        }
    }
}

fn pagination(page: Option<i64>, per_page: Option<i64>) -> Pagination {
    Pagination {
        page: page.unwrap_or(DEFAULT_PAGE),
        page_size: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
    }
}

fn flag(name: &str, value: Option<u8>) -> Result<Option<bool>, AppError> {
    match value {
        None => Ok(None),
        Some(0) => Ok(Some(false)),
        Some(1) => Ok(Some(true)),
        Some(other) => Err(AppError::BadRequest(format!(
            "{} must be 0 or 1, got {}",
            name, other
        ))),
    }
}

async fn list_subscribers(
    state: AppState,
    principal: Principal,
    kind: SubscriberKind,
    query: SubscriberListQuery,
) -> Result<Json<ListResponse<DerivedRow>>, AppError> {
    let filters = ListingFilters {
        search: query.search,
        is_trial: flag("is_trial", query.is_trial)?,
        active_connections: flag("active_connections", query.active_connections)?,
    };
    let page = state
        .listings
        .list_subscribers(
            &principal,
            kind,
            pagination(query.page, query.per_page),
            filters,
        )
        .await?;
    Ok(Json(page.into()))
}

pub async fn list_lines(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SubscriberListQuery>,
) -> Result<Json<ListResponse<DerivedRow>>, AppError> {
    list_subscribers(state, principal, SubscriberKind::Line, query).await
}

pub async fn list_mag_devices(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SubscriberListQuery>,
) -> Result<Json<ListResponse<DerivedRow>>, AppError> {
    list_subscribers(state, principal, SubscriberKind::MagDevice, query).await
}

pub async fn list_enigma_devices(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SubscriberListQuery>,
) -> Result<Json<ListResponse<DerivedRow>>, AppError> {
    list_subscribers(state, principal, SubscriberKind::EnigmaDevice, query).await
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PaymentListQuery>,
) -> Result<Json<ListResponse<LedgerEntry>>, AppError> {
    let page = state
        .listings
        .list_payments(
            &principal,
            pagination(query.page, query.per_page),
            query.search,
            query.sort.unwrap_or_default(),
            query.direction.unwrap_or_default(),
        )
        .await?;
    Ok(Json(page.into()))
}
