// ── Runtime host configuration ──
//
// Describes *where* the designer server and hub live and how the host
// should behave. The embedding application constructs a `DeckConfig` and
// hands it in -- core never reads config files.

use std::path::PathBuf;
use std::time::Duration;

use homedeck_api::{ReconnectPolicy, TlsMode};
use url::Url;

/// Tag prefix for widget elements. A widget named `clock` registers the
/// runtime tag `cwc-clock`.
pub const WIDGET_PREFIX: &str = "cwc-";

/// Configuration for one dashboard host.
#[derive(Debug, Clone)]
pub struct DeckConfig {
    /// Designer server base URL (auth + component source).
    pub server_url: Url,
    /// Hub WebSocket endpoint for the entity feed.
    pub hub_ws_url: Url,
    /// Runtime tag prefix for widgets.
    pub widget_prefix: String,
    /// TLS verification for the designer server.
    pub tls: TlsMode,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Feed reconnection policy.
    pub reconnect: ReconnectPolicy,
    /// Where to persist the access token. `None` disables persistence.
    pub token_path: Option<PathBuf>,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".parse().expect("valid default URL"),
            hub_ws_url: "ws://homeassistant.local:8123/api/websocket"
                .parse()
                .expect("valid default URL"),
            widget_prefix: WIDGET_PREFIX.into(),
            tls: TlsMode::default(),
            timeout: Duration::from_secs(50),
            reconnect: ReconnectPolicy::default(),
            token_path: None,
        }
    }
}

impl DeckConfig {
    /// Transport settings for the designer server client.
    pub fn transport(&self) -> homedeck_api::TransportConfig {
        homedeck_api::TransportConfig {
            tls: self.tls.clone(),
            timeout: self.timeout,
        }
    }
}
