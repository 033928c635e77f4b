//! Streaming-server descriptors and playlist output formats used to build download links.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StreamingServer {
    pub id: i64,
    pub domain_name: Option<String>,
    pub server_ip: String,
    pub http_broadcast_port: i32,
}

impl StreamingServer {
    /// Public host for links: the domain name when one is configured, the IP otherwise.
    pub fn host(&self) -> &str {
        self.domain_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.server_ip)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A playlist flavour offered as a download link.
pub struct OutputFormat {
    pub label: String,
    pub query_string: String,
    /// When set, the link is wrapped in a `wget`/`chmod` bootstrap writing to this path.
    #[serde(default)]
    pub script_path: Option<String>,
}

impl OutputFormat {
    fn plain(label: &str, query_string: &str) -> Self {
        Self {
            label: label.to_string(),
            query_string: query_string.to_string(),
            script_path: None,
        }
    }

    fn script(label: &str, query_string: &str, path: &str) -> Self {
        Self {
            label: label.to_string(),
            query_string: query_string.to_string(),
            script_path: Some(path.to_string()),
        }
    }
}

pub fn default_output_formats() -> Vec<OutputFormat> {
    vec![
        OutputFormat::plain("M3U", "type=m3u"),
        OutputFormat::plain("M3U Plus", "type=m3u_plus&output=ts"),
        OutputFormat::plain("M3U Plus HLS", "type=m3u_plus&output=m3u8"),
        OutputFormat::plain("Simple List", "type=simple"),
        OutputFormat::script(
            "Enigma 2 OE 1.6 Auto Script",
            "type=enigma16_script&output=ts",
            "/etc/enigma2/iptv.sh",
        ),
        OutputFormat::script(
            "Enigma 2 OE 2.0 Auto Script",
            "type=enigma22_script&output=ts",
            "/etc/enigma2/iptv.sh",
        ),
        OutputFormat::plain("DreamBox OE 2.0", "type=dreambox&output=ts"),
        OutputFormat::plain("GigaBlue", "type=gigablue&output=ts"),
        OutputFormat::plain("Octagon", "type=octagon&output=ts"),
        OutputFormat::plain("WebTV List", "type=webtvlist&output=ts"),
    ]
}
