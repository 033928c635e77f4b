//! Reseller tree position to row-visibility scope.

use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::models::principal::{Principal, VisibilityScope};
use crate::repositories::reseller::ResellerStore;

/// Super admins see everything; everyone else sees their own rows and those of
/// their direct subordinates. Grandchildren stay invisible.
pub fn scope_for(principal: &Principal) -> VisibilityScope {
    if principal.is_super_admin() {
        return VisibilityScope {
            owner_ids: BTreeSet::new(),
            unrestricted: true,
        };
    }

    let mut owner_ids = principal.direct_subordinate_ids.clone();
    owner_ids.insert(principal.id);
    VisibilityScope {
        owner_ids,
        unrestricted: false,
    }
}

/// Rebuilds the principal for `reseller_id` from the store. `None` when the
/// account no longer exists or is suspended.
pub async fn resolve_principal(
    store: &dyn ResellerStore,
    reseller_id: i64,
) -> Result<Option<Principal>, StoreError> {
    let reseller = match store.find_by_id(reseller_id).await? {
        Some(reseller) if !reseller.suspend_state.is_suspended() => reseller,
        _ => return Ok(None),
    };
    let subordinates = store.direct_subordinate_ids(reseller.id).await?;
    Ok(Some(Principal::from_reseller(&reseller, subordinates)))
}
