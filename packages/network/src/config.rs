//! Network configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the network layer and its in-process transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// How long a request waits for its response.
    pub request_timeout_ms: u64,
    /// Fire messages buffered per channel while no listener is connected.
    pub fire_queue_capacity: usize,
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            fire_queue_capacity: 256,
        }
    }
}
