//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the router server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"localhost"`).
    pub host: String,
    /// Port to bind. `0` picks a free port.
    pub port: u16,
    /// Outbound queue depth per connection before messages are dropped.
    pub max_send_queue: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Transport-level ping interval in seconds.
    pub ping_interval_secs: u64,
    /// Evict connections silent for this long. `None` never evicts.
    pub idle_timeout_secs: Option<u64>,
    /// How often the idle sweeper runs, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8765,
            max_send_queue: 256,
            max_message_size: 1024 * 1024,
            ping_interval_secs: 30,
            idle_timeout_secs: None,
            sweep_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Eviction threshold. `None` or `Some(0)` disables eviction.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
