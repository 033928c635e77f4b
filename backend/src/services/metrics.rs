//! Read-time fields derived from a subscriber record and its live sessions.

use chrono::{DateTime, Utc};
use url::form_urlencoded;

use crate::models::{
    server::{OutputFormat, StreamingServer},
    subscriber::{ActiveConnectionSample, DerivedRow, DownloadLink, SubscriberRecord},
};

/// Upper bound, in seconds, on the window a single session contributes.
pub const MAX_SAMPLE_WINDOW_SECS: i64 = 300;
const BYTES_PER_MEBIBYTE: f64 = 1_048_576.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bandwidth {
    pub kbps: f64,
    pub mbps: f64,
}

impl Bandwidth {
    pub const ZERO: Bandwidth = Bandwidth { kbps: 0.0, mbps: 0.0 };
}

/// Everything outside the record that download links depend on.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    pub primary_server: Option<&'a StreamingServer>,
    pub output_formats: &'a [OutputFormat],
}

/// `0` and missing expiry dates never expire.
pub fn is_expired(expires_at: Option<i64>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(exp) if exp > 0 => exp.saturating_mul(1000) <= now.timestamp_millis(),
        _ => false,
    }
}

pub fn active_connections<'a, I>(samples: I) -> i64
where
    I: IntoIterator<Item = &'a ActiveConnectionSample>,
{
    samples
        .into_iter()
        .filter(|sample| !sample.session_ended)
        .count() as i64
}

fn sample_window(sample: &ActiveConnectionSample, now: DateTime<Utc>) -> i64 {
    let end = if sample.last_read_at > 0 {
        sample.last_read_at
    } else if !sample.session_ended {
        now.timestamp()
    } else {
        sample.session_started_at
    };
    end.saturating_sub(sample.session_started_at).clamp(1, MAX_SAMPLE_WINDOW_SECS)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Estimated throughput across the open sessions of one subscriber.
pub fn bandwidth<'a, I>(samples: I, now: DateTime<Utc>) -> Bandwidth
where
    I: IntoIterator<Item = &'a ActiveConnectionSample>,
{
    let (divergence, window) = samples
        .into_iter()
        .filter(|sample| !sample.session_ended)
        .fold((0.0f64, 0i64), |(div, win), sample| {
            (div + sample.divergence, win.saturating_add(sample_window(sample, now)))
        });

    if window == 0 {
        return Bandwidth::ZERO;
    }

    let bits_per_second = divergence * BYTES_PER_MEBIBYTE * 8.0 / window.max(1) as f64;
    Bandwidth {
        kbps: round_to(bits_per_second / 1000.0, 2),
        mbps: round_to(bits_per_second / 1_000_000.0, 3),
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// One link per configured output format, in configuration order. Without a
/// primary server there is no port to link to, so the list is empty.
pub fn download_links(record: &SubscriberRecord, context: &LinkContext<'_>) -> Vec<DownloadLink> {
    let Some(server) = context.primary_server else {
        return Vec::new();
    };
    let host = record
        .owner_dns
        .as_deref()
        .map(str::trim)
        .filter(|dns| !dns.is_empty())
        .unwrap_or_else(|| server.host());

    let base = format!(
        "http://{}:{}/get.php?username={}&password={}",
        host,
        server.http_broadcast_port,
        encode(&record.username),
        encode(&record.password)
    );

    context
        .output_formats
        .iter()
        .map(|format| {
            let url = format!("{}&{}", base, format.query_string);
            let url = match format.script_path.as_deref() {
                Some(path) => format!(
                    "wget -O {path} \"{url}\" && chmod 777 {path} && {path}",
                    path = path,
                    url = url
                ),
                None => url,
            };
            DownloadLink {
                label: format.label.clone(),
                url,
            }
        })
        .collect()
}

/// Combines a record with its samples into the row returned to callers.
pub fn derive_row(
    record: SubscriberRecord,
    samples: &[&ActiveConnectionSample],
    context: &LinkContext<'_>,
    now: DateTime<Utc>,
) -> DerivedRow {
    let speed = bandwidth(samples.iter().copied(), now);
    let download_links = download_links(&record, context);
    DerivedRow {
        active_connections: active_connections(samples.iter().copied()),
        speed_kbps: speed.kbps,
        speed_mbps: speed.mbps,
        is_expired: is_expired(record.expires_at, now),
        download_links,
        record,
    }
}
