//! Host configuration.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

/// Configuration for a [`HostContext`](crate::HostContext).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Side this host runs on. Decides which package domains resolve.
    pub side: Side,
}

impl HostConfig {
    pub fn server() -> Self {
        Self { side: Side::Server }
    }

    pub fn client() -> Self {
        Self { side: Side::Client }
    }
}
