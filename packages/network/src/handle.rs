//! Role-aware channel handles.
//!
//! The authoritative side gets the raw primitive. The dependent side gets a
//! [`ChannelProxy`] that can only `invoke` and `send`; it has no way to
//! install callbacks, connect listeners or reach the primitive underneath.

use std::fmt;

use async_trait::async_trait;
use trellis_core::Value;
use trellis_packages::Side;

use crate::caller::Caller;
use crate::definition::ChannelKind;
use crate::error::{NetworkError, Result};
use crate::transport::RawChannel;

/// Which side of the application a handle is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Authoritative,
    Dependent,
}

impl From<Side> for Role {
    fn from(side: Side) -> Self {
        match side {
            Side::Server => Role::Authoritative,
            Side::Client => Role::Dependent,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Authoritative => write!(f, "authoritative"),
            Role::Dependent => write!(f, "dependent"),
        }
    }
}

/// The capability shared by both handle variants.
#[async_trait]
pub trait Remote: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Invoke a request channel and wait for the response.
    async fn invoke(&self, args: Vec<Value>) -> Result<Value>;

    /// Send on a fire channel. No acknowledgement.
    fn send(&self, args: Vec<Value>) -> Result<()>;
}

fn mismatch(raw: &RawChannel, expected: ChannelKind) -> NetworkError {
    NetworkError::KindMismatch {
        communicator: raw.communicator().to_string(),
        channel: raw.name().to_string(),
        expected,
        actual: raw.kind(),
    }
}

async fn invoke_as(raw: &RawChannel, caller: &Caller, args: Vec<Value>) -> Result<Value> {
    match raw {
        RawChannel::Request(primitive) => primitive.invoke(caller, args).await,
        RawChannel::Fire(_) => Err(mismatch(raw, ChannelKind::Request)),
    }
}

fn send_as(raw: &RawChannel, caller: &Caller, args: Vec<Value>) -> Result<()> {
    match raw {
        RawChannel::Fire(primitive) => primitive.send(caller, args),
        RawChannel::Request(_) => Err(mismatch(raw, ChannelKind::Fire)),
    }
}

/// Restricted view of a channel for the dependent side.
#[derive(Clone)]
pub struct ChannelProxy {
    inner: RawChannel,
    caller: Caller,
}

impl ChannelProxy {
    pub(crate) fn new(inner: RawChannel, caller: Caller) -> Self {
        Self { inner, caller }
    }

    pub fn communicator(&self) -> &str {
        self.inner.communicator()
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The session invocations are attributed to.
    pub fn caller(&self) -> &Caller {
        &self.caller
    }
}

#[async_trait]
impl Remote for ChannelProxy {
    fn kind(&self) -> ChannelKind {
        self.inner.kind()
    }

    async fn invoke(&self, args: Vec<Value>) -> Result<Value> {
        invoke_as(&self.inner, &self.caller, args).await
    }

    fn send(&self, args: Vec<Value>) -> Result<()> {
        send_as(&self.inner, &self.caller, args)
    }
}

impl fmt::Debug for ChannelProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelProxy")
            .field("communicator", &self.communicator())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("caller", &self.caller.id())
            .finish()
    }
}

/// A channel handle, shaped by the role it was requested for.
#[derive(Clone, Debug)]
pub enum ChannelHandle {
    /// Full access for the authoritative side.
    Raw(RawChannel),
    /// `invoke`/`send` only, for the dependent side.
    Proxy(ChannelProxy),
}

impl ChannelHandle {
    pub fn role(&self) -> Role {
        match self {
            ChannelHandle::Raw(_) => Role::Authoritative,
            ChannelHandle::Proxy(_) => Role::Dependent,
        }
    }

    pub fn communicator(&self) -> &str {
        match self {
            ChannelHandle::Raw(raw) => raw.communicator(),
            ChannelHandle::Proxy(proxy) => proxy.communicator(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ChannelHandle::Raw(raw) => raw.name(),
            ChannelHandle::Proxy(proxy) => proxy.name(),
        }
    }

    /// The raw primitive. `None` for dependent handles.
    pub fn raw(&self) -> Option<&RawChannel> {
        match self {
            ChannelHandle::Raw(raw) => Some(raw),
            ChannelHandle::Proxy(_) => None,
        }
    }

    pub fn into_proxy(self) -> Option<ChannelProxy> {
        match self {
            ChannelHandle::Proxy(proxy) => Some(proxy),
            ChannelHandle::Raw(_) => None,
        }
    }
}

/// Raw handles act as the authority.
#[async_trait]
impl Remote for ChannelHandle {
    fn kind(&self) -> ChannelKind {
        match self {
            ChannelHandle::Raw(raw) => raw.kind(),
            ChannelHandle::Proxy(proxy) => proxy.kind(),
        }
    }

    async fn invoke(&self, args: Vec<Value>) -> Result<Value> {
        match self {
            ChannelHandle::Raw(raw) => invoke_as(raw, &Caller::authority(), args).await,
            ChannelHandle::Proxy(proxy) => proxy.invoke(args).await,
        }
    }

    fn send(&self, args: Vec<Value>) -> Result<()> {
        match self {
            ChannelHandle::Raw(raw) => send_as(raw, &Caller::authority(), args),
            ChannelHandle::Proxy(proxy) => proxy.send(args),
        }
    }
}
