//! Reseller accounts and the hierarchy columns the visibility rules depend on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role level with unrestricted visibility across every reseller's rows.
pub const SUPER_ADMIN_LEVEL: i32 = 1;
/// Role level assigned to accounts that must finish a password reset first.
pub const RESET_REQUIRED_LEVEL: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
/// Suspension flag stored as a small integer in `resellers.suspend`.
pub enum SuspendState {
    #[default]
    None,
    /// The reseller cannot sign in; their subscribers keep working.
    ResellerOnly,
    /// Both the reseller and every subscriber they own are blocked.
    ResellerAndUsers,
}

impl SuspendState {
    pub fn is_suspended(self) -> bool {
        self != SuspendState::None
    }
}

impl TryFrom<i16> for SuspendState {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SuspendState::None),
            1 => Ok(SuspendState::ResellerOnly),
            2 => Ok(SuspendState::ResellerAndUsers),
            other => Err(format!("unknown suspend state {}", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
/// Database representation of a reseller (admin) account.
pub struct Reseller {
    pub id: i64,
    /// Login name, restricted to `[A-Za-z0-9-]`.
    pub username: String,
    /// Legacy two-stage digest, see [`crate::utils::password`].
    pub password_digest: String,
    pub display_name: Option<String>,
    pub role_level: i32,
    /// Direct parent in the reseller tree (`father`).
    pub parent_id: Option<i64>,
    #[sqlx(try_from = "i16")]
    pub suspend_state: SuspendState,
    pub member_group_id: i64,
    /// Optional DNS name used instead of the primary server in download links.
    pub reseller_dns: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
}

impl Reseller {
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}
