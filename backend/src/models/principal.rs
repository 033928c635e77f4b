//! The authenticated caller and the row-visibility scope it implies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::reseller::{Reseller, SUPER_ADMIN_LEVEL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Identity established at login. Immutable for the lifetime of a request.
pub struct Principal {
    pub id: i64,
    pub display_name: String,
    pub role_level: i32,
    pub member_group_id: i64,
    /// Resellers whose `parent_id` is this principal. One level only.
    pub direct_subordinate_ids: BTreeSet<i64>,
}

impl Principal {
    pub fn from_reseller(reseller: &Reseller, direct_subordinate_ids: BTreeSet<i64>) -> Self {
        Self {
            id: reseller.id,
            display_name: reseller.display_name().to_string(),
            role_level: reseller.role_level,
            member_group_id: reseller.member_group_id,
            direct_subordinate_ids,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role_level == SUPER_ADMIN_LEVEL
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Set of owner ids whose records a principal may see.
pub struct VisibilityScope {
    pub owner_ids: BTreeSet<i64>,
    pub unrestricted: bool,
}

impl VisibilityScope {
    pub fn allows(&self, owner_id: i64) -> bool {
        self.unrestricted || self.owner_ids.contains(&owner_id)
    }
}
