pub mod ledger;
pub mod login_attempt;
pub mod page;
pub mod principal;
pub mod reseller;
pub mod server;
pub mod subscriber;
