//! Top-level configuration.

use serde::{Deserialize, Serialize};
use trellis_core::{Error, Result};
use trellis_network::NetworkConfig;
use trellis_packages::HostConfig;

/// Configuration for a [`Trellis`](crate::Trellis) instance.
///
/// Every field has a default, so `{}` is a valid document:
///
/// ```json
/// {
///     "host": { "side": "client" },
///     "network": { "request_timeout_ms": 5000, "fire_queue_capacity": 64 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    pub host: HostConfig,
    pub network: NetworkConfig,
}

impl TrellisConfig {
    pub fn server() -> Self {
        Self {
            host: HostConfig::server(),
            ..Self::default()
        }
    }

    pub fn client() -> Self {
        Self {
            host: HostConfig::client(),
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Decode {
            message: e.to_string(),
        })
    }
}
