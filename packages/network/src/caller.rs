//! Caller identity attached to every inbound invocation.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Unique identifier for a calling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallerId(Uuid);

impl CallerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The party that originated a call: a connection or session supplied by the
/// host, with an optional human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller {
    id: CallerId,
    label: Option<Arc<str>>,
}

impl Caller {
    /// A fresh anonymous session.
    pub fn new() -> Self {
        Self {
            id: CallerId::new(),
            label: None,
        }
    }

    /// A fresh session with a label, such as a player name.
    pub fn named(label: impl AsRef<str>) -> Self {
        Self {
            id: CallerId::new(),
            label: Some(Arc::from(label.as_ref())),
        }
    }

    pub fn with_id(id: CallerId) -> Self {
        Self { id, label: None }
    }

    /// The authoritative side calling its own channels.
    pub fn authority() -> Self {
        Self {
            id: CallerId(Uuid::nil()),
            label: Some(Arc::from("authority")),
        }
    }

    pub fn id(&self) -> CallerId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_authority(&self) -> bool {
        self.id.0.is_nil()
    }
}

impl Default for Caller {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({})", label, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}
