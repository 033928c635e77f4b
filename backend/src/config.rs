use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::server::{default_output_formats, OutputFormat};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: u64,
    pub password_salt_primary: String,
    pub password_salt_secondary: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_seconds: u64,
    pub db_max_attempts: u32,
    pub db_call_deadline_ms: u64,
    pub production_mode: bool,
    /// Loopback addresses exempt from the brute-force guard. Always empty in production.
    pub login_guard_bypass: Vec<IpAddr>,
    pub output_formats: Vec<OutputFormat>,
    pub bind_address: SocketAddr,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let jwt_secret = required(&lookup, "JWT_SECRET")?;
        let password_salt_primary = required(&lookup, "PASSWORD_SALT_PRIMARY")?;
        let password_salt_secondary = required(&lookup, "PASSWORD_SALT_SECONDARY")?;

        let jwt_expiration_hours = parsed(&lookup, "JWT_EXPIRATION_HOURS", 24)?;
        let db_max_connections = parsed(&lookup, "DB_MAX_CONNECTIONS", 10u32)?.max(1);
        let db_acquire_timeout_seconds = parsed(&lookup, "DB_ACQUIRE_TIMEOUT_SECONDS", 5)?;
        let db_max_attempts = parsed(&lookup, "DB_MAX_ATTEMPTS", 3u32)?.max(1);
        let db_call_deadline_ms = parsed(&lookup, "DB_CALL_DEADLINE_MS", 10_000)?;
        let production_mode = parsed(&lookup, "PRODUCTION_MODE", true)?;

        let login_guard_bypass = match lookup("LOGIN_GUARD_BYPASS_ADDRESSES") {
            Some(raw) if !raw.trim().is_empty() => {
                parse_bypass_addresses(&raw, production_mode)?
            }
            _ => Vec::new(),
        };

        let output_formats = match lookup("OUTPUT_FORMATS") {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<Vec<OutputFormat>>(&raw)
                .map_err(|e| ConfigError::Invalid {
                    key: "OUTPUT_FORMATS",
                    reason: e.to_string(),
                })?,
            _ => default_output_formats(),
        };

        let bind_address = parsed(
            &lookup,
            "BIND_ADDRESS",
            SocketAddr::from(([0, 0, 0, 0], 3000)),
        )?;

        Ok(Config {
            database_url,
            jwt_secret,
            jwt_expiration_hours,
            password_salt_primary,
            password_salt_secondary,
            db_max_connections,
            db_acquire_timeout_seconds,
            db_max_attempts,
            db_call_deadline_ms,
            production_mode,
            login_guard_bypass,
            output_formats,
            bind_address,
        })
    }

    pub fn db_call_deadline(&self) -> Duration {
        Duration::from_millis(self.db_call_deadline_ms.max(1))
    }

    pub fn db_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_seconds.max(1))
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

fn parse_bypass_addresses(raw: &str, production_mode: bool) -> Result<Vec<IpAddr>, ConfigError> {
    if production_mode {
        return Err(ConfigError::Invalid {
            key: "LOGIN_GUARD_BYPASS_ADDRESSES",
            reason: "bypass addresses are not allowed when PRODUCTION_MODE is enabled".into(),
        });
    }

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let addr: IpAddr = entry.parse().map_err(|_| ConfigError::Invalid {
                key: "LOGIN_GUARD_BYPASS_ADDRESSES",
                reason: format!("`{}` is not an IP address", entry),
            })?;
            if !addr.is_loopback() {
                return Err(ConfigError::Invalid {
                    key: "LOGIN_GUARD_BYPASS_ADDRESSES",
                    reason: format!("`{}` is not a loopback address", entry),
                });
            }
            Ok(addr)
        })
        .collect()
}
