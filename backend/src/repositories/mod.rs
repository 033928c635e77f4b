pub mod common;
pub mod ledger;
pub mod listing_query;
pub mod login_attempt;
pub mod login_event;
pub mod reseller;
pub mod subscriber;

pub use common::*;
pub use ledger::{LedgerStore, PgLedgerStore};
pub use listing_query::{ListingFilters, ListingQuery, Pagination, SortOrder};
pub use login_attempt::{LoginAttemptStore, PgLoginAttemptStore};
pub use login_event::{LoginEventStore, PgLoginEventStore};
pub use reseller::{PgResellerStore, ResellerStore};
pub use subscriber::{PgSubscriberStore, SubscriberStore};
