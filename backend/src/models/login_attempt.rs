use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
/// Failed-login bookkeeping for a single source address.
pub struct LoginAttemptRecord {
    pub source_address: String,
    pub username: String,
    pub attempt_count: i32,
    pub locked_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginEventOutcome {
    Success,
    RateLimited,
    Suspended,
    ResetRequired,
    InvalidCredentials,
}

impl LoginEventOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginEventOutcome::Success => "success",
            LoginEventOutcome::RateLimited => "rate_limited",
            LoginEventOutcome::Suspended => "suspended",
            LoginEventOutcome::ResetRequired => "reset_required",
            LoginEventOutcome::InvalidCredentials => "invalid_credentials",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginEvent {
    pub reseller_id: Option<i64>,
    pub username: String,
    pub source_address: String,
    pub outcome: LoginEventOutcome,
    pub occurred_at: DateTime<Utc>,
}
