// ── Runtime connection configuration ──
//
// Describes *how* to connect to a SignalK server: endpoint, credential,
// and cache/polling tuning. The embedding application constructs a
// `ClientConfig` and hands it in -- core never reads config files.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Configuration for one SignalK server connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base REST endpoint, e.g. `http://boat.local:3000/signalk/v1/api/`.
    pub endpoint: Url,
    /// Bearer token for authenticated servers.
    pub token: Option<SecretString>,
    /// Name identifying this connection in persisted session records.
    pub connection_name: String,
    /// Request timeout.
    pub timeout: Duration,
    /// How often the background poll refreshes stale values. Zero disables
    /// the poll timer entirely.
    pub update_rate: Duration,
    /// Age past which a cached value is considered stale and re-fetched.
    pub stale_after: Duration,
    /// Delay between write-acknowledgement status polls.
    pub write_poll_delay: Duration,
    /// How many status polls to attempt before a write is declared lost.
    pub write_poll_retries: u32,
    /// Master switch for background refresh; `false` leaves the cache
    /// read-through only.
    pub updating_enabled: bool,
}

impl ClientConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            token: None,
            connection_name: "default".into(),
            timeout: Duration::from_secs(30),
            update_rate: Duration::from_secs(1),
            stale_after: Duration::from_secs(30),
            write_poll_delay: Duration::from_secs(1),
            write_poll_retries: 8,
            updating_enabled: true,
        }
    }
}
