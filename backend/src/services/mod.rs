pub mod authenticator;
pub mod brute_force;
pub mod hierarchy;
pub mod listing;
pub mod metrics;

pub use authenticator::{Authenticator, LoginOutcome, LoginRequest};
pub use brute_force::{BruteForceGuard, GuardDecision};
pub use listing::ListingService;
