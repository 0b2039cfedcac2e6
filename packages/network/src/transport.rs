//! Host transport primitives.
//!
//! The network layer never owns the wire. A [`Transport`] hands out one
//! primitive per declared channel: a [`RequestPrimitive`] for request/response
//! channels and a [`FirePrimitive`] for fire-and-forget channels. The
//! authoritative side holds these primitives directly; the dependent side only
//! ever sees them through a proxy.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use trellis_core::Value;

use crate::caller::Caller;
use crate::definition::ChannelKind;
use crate::error::{RemoteError, Result};

/// What a request callback answers with.
pub type Response = std::result::Result<Value, RemoteError>;

/// Inbound callback installed on a request primitive.
pub type InvokeCallback = Arc<dyn Fn(&Caller, Vec<Value>) -> Response + Send + Sync>;

/// Inbound listener connected to a fire primitive.
pub type FireListener = Arc<dyn Fn(&Caller, Vec<Value>) + Send + Sync>;

/// Identifies one listener connection on a fire primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// A request/response channel primitive.
#[async_trait]
pub trait RequestPrimitive: Send + Sync {
    fn communicator(&self) -> &str;

    fn name(&self) -> &str;

    /// Install the inbound callback, replacing any previous one.
    fn on_invoke(&self, callback: InvokeCallback);

    /// Remove the inbound callback.
    fn clear_callback(&self);

    fn has_callback(&self) -> bool;

    /// Invoke the channel and wait for its response.
    async fn invoke(&self, caller: &Caller, args: Vec<Value>) -> Result<Value>;
}

/// A fire-and-forget channel primitive.
pub trait FirePrimitive: Send + Sync {
    fn communicator(&self) -> &str;

    fn name(&self) -> &str;

    /// Connect an inbound listener.
    fn connect(&self, listener: FireListener) -> ConnectionId;

    /// Disconnect a listener. Returns false if it was not connected.
    fn disconnect(&self, id: ConnectionId) -> bool;

    fn listener_count(&self) -> usize;

    /// Messages buffered while nothing is connected.
    fn pending(&self) -> usize;

    /// Send without waiting for any acknowledgement.
    fn send(&self, caller: &Caller, args: Vec<Value>) -> Result<()>;
}

/// Supplies channel primitives.
///
/// Called once per declared channel when communicators are appended.
pub trait Transport: Send + Sync {
    fn request_channel(&self, communicator: &str, channel: &str)
        -> Result<Arc<dyn RequestPrimitive>>;

    fn fire_channel(&self, communicator: &str, channel: &str) -> Result<Arc<dyn FirePrimitive>>;
}

/// A raw primitive with its full capability set.
#[derive(Clone)]
pub enum RawChannel {
    Request(Arc<dyn RequestPrimitive>),
    Fire(Arc<dyn FirePrimitive>),
}

impl RawChannel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            RawChannel::Request(_) => ChannelKind::Request,
            RawChannel::Fire(_) => ChannelKind::Fire,
        }
    }

    pub fn communicator(&self) -> &str {
        match self {
            RawChannel::Request(p) => p.communicator(),
            RawChannel::Fire(p) => p.communicator(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RawChannel::Request(p) => p.name(),
            RawChannel::Fire(p) => p.name(),
        }
    }

    pub fn as_request(&self) -> Option<&Arc<dyn RequestPrimitive>> {
        match self {
            RawChannel::Request(p) => Some(p),
            RawChannel::Fire(_) => None,
        }
    }

    pub fn as_fire(&self) -> Option<&Arc<dyn FirePrimitive>> {
        match self {
            RawChannel::Fire(p) => Some(p),
            RawChannel::Request(_) => None,
        }
    }

    /// True if both wrap the same primitive.
    pub fn ptr_eq(&self, other: &RawChannel) -> bool {
        match (self, other) {
            (RawChannel::Request(a), RawChannel::Request(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (RawChannel::Fire(a), RawChannel::Fire(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for RawChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawChannel")
            .field("kind", &self.kind())
            .field("communicator", &self.communicator())
            .field("name", &self.name())
            .finish()
    }
}
