//! Per-address failed-login throttling backed by the `login_attempts` table.

use chrono::{DateTime, Duration, Utc};
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::login_attempt::LoginAttemptRecord;
use crate::repositories::login_attempt::LoginAttemptStore;
use crate::utils::time::Clock;

/// Failures from one address after which every further attempt is rejected.
pub const MAX_FAILED_ATTEMPTS: i32 = 3;
/// How long the lock lasts after the most recent failure.
pub const LOCKOUT_SECONDS: i64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed,
    Blocked { retry_after_secs: u64 },
}

/// Decides whether an address may attempt a login given its stored record.
pub fn evaluate(record: Option<&LoginAttemptRecord>, now: DateTime<Utc>) -> GuardDecision {
    match record {
        Some(record) if record.attempt_count >= MAX_FAILED_ATTEMPTS && now < record.locked_until => {
            let remaining_ms = (record.locked_until - now).num_milliseconds();
            let retry_after_secs = ((remaining_ms + 999) / 1000).max(1) as u64;
            GuardDecision::Blocked { retry_after_secs }
        }
        _ => GuardDecision::Allowed,
    }
}

#[derive(Clone)]
pub struct BruteForceGuard {
    store: Arc<dyn LoginAttemptStore>,
    clock: Arc<dyn Clock>,
    bypass: Vec<IpAddr>,
}

impl BruteForceGuard {
    /// `bypass` must already be validated by configuration loading (loopback only,
    /// never in production).
    pub fn new(store: Arc<dyn LoginAttemptStore>, clock: Arc<dyn Clock>, bypass: Vec<IpAddr>) -> Self {
        Self {
            store,
            clock,
            bypass,
        }
    }

    fn is_bypassed(&self, source_address: &str) -> bool {
        source_address
            .parse::<IpAddr>()
            .map(|addr| self.bypass.contains(&addr))
            .unwrap_or(false)
    }

    pub async fn check(&self, source_address: &str) -> Result<GuardDecision, StoreError> {
        if self.is_bypassed(source_address) {
            return Ok(GuardDecision::Allowed);
        }
        let record = self.store.find(source_address).await?;
        Ok(evaluate(record.as_ref(), self.clock.now()))
    }

    pub async fn record_failure(&self, username: &str, source_address: &str) -> Result<(), StoreError> {
        if self.is_bypassed(source_address) {
            return Ok(());
        }
        let locked_until = self.clock.now() + Duration::seconds(LOCKOUT_SECONDS);
        let record = self
            .store
            .record_failure(username, source_address, locked_until)
            .await?;
        if record.attempt_count >= MAX_FAILED_ATTEMPTS {
            tracing::warn!(
                source_address,
                attempts = record.attempt_count,
                "source address locked out after repeated login failures"
            );
        }
        Ok(())
    }

    pub async fn clear(&self, source_address: &str) -> Result<(), StoreError> {
        if self.is_bypassed(source_address) {
            return Ok(());
        }
        self.store.clear(source_address).await
    }
}
