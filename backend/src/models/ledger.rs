//! Credit ledger entries shown in the payments listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub reseller_id: i64,
    pub credit: i64,
    pub debit: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
/// Columns a payments listing may be ordered by.
pub enum PaymentSort {
    #[default]
    Id,
    CreatedAt,
    Credit,
    Debit,
}

impl PaymentSort {
    pub fn column(self) -> &'static str {
        match self {
            PaymentSort::Id => "id",
            PaymentSort::CreatedAt => "created_at",
            PaymentSort::Credit => "credit",
            PaymentSort::Debit => "debit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}
