//! Which side of the application a host runs on, and where a package may live.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The side a host process runs on.
///
/// The server is the authoritative side; clients are dependent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Server,
    Client,
}

impl Side {
    pub fn is_server(self) -> bool {
        self == Side::Server
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Server => write!(f, "server"),
            Side::Client => write!(f, "client"),
        }
    }
}

/// Where a package may be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Available on both sides.
    #[default]
    Shared,
    Server,
    Client,
}

impl Domain {
    /// Whether a host running on `side` may resolve a package in this domain.
    pub fn allows(self, side: Side) -> bool {
        match self {
            Domain::Shared => true,
            Domain::Server => side == Side::Server,
            Domain::Client => side == Side::Client,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Shared => write!(f, "shared"),
            Domain::Server => write!(f, "server"),
            Domain::Client => write!(f, "client"),
        }
    }
}
