//! Subscriber lines, set-top-box devices and their live-session samples.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Which subscriber listing a query targets.
pub enum SubscriberKind {
    Line,
    MagDevice,
    EnigmaDevice,
}

impl SubscriberKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriberKind::Line => "line",
            SubscriberKind::MagDevice => "mag_device",
            SubscriberKind::EnigmaDevice => "enigma_device",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
/// Raw subscriber row as read by the listing engine.
pub struct SubscriberRecord {
    /// Line id for lines, device id for MAG/Enigma rows.
    pub id: i64,
    /// Line the row belongs to; live sessions are keyed by it.
    pub line_id: i64,
    /// Reseller that created the record (`created_by`).
    pub owner_admin_id: i64,
    pub username: String,
    /// Legacy plain value, stored and returned as-is.
    pub password: String,
    pub package_id: Option<i64>,
    pub is_trial: bool,
    pub enabled: bool,
    pub admin_enabled: bool,
    /// Unix seconds; `None` or `0` means the line never expires.
    pub expires_at: Option<i64>,
    pub allowed_country: Option<String>,
    pub notes: Option<String>,
    pub max_connections: i32,
    /// MAC address for MAG/Enigma devices, `None` for plain lines.
    pub identifier: Option<String>,
    #[serde(skip)]
    pub owner_dns: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
/// One open (or just closed) streaming session.
pub struct ActiveConnectionSample {
    pub subscriber_id: i64,
    pub source_ip: String,
    pub geo_country: Option<String>,
    /// Unix seconds.
    pub session_started_at: i64,
    /// Unix seconds of the last segment read; `0` when nothing was read yet.
    pub last_read_at: i64,
    pub session_ended: bool,
    pub divergence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
/// A subscriber row enriched with fields computed at read time.
pub struct DerivedRow {
    #[serde(flatten)]
    pub record: SubscriberRecord,
    pub active_connections: i64,
    pub speed_kbps: f64,
    pub speed_mbps: f64,
    pub is_expired: bool,
    pub download_links: Vec<DownloadLink>,
}
