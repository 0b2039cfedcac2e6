//! Maps `(communicator, channel, role)` to a channel handle.

use std::collections::HashMap;

use tracing::debug;
use trellis_core::{EntryKind, Error, Result};

use crate::caller::Caller;
use crate::catalog::Catalog;
use crate::handle::{ChannelHandle, ChannelProxy, Role};
use crate::transport::RawChannel;

/// Primitives allocated for every catalogued channel.
#[derive(Default, Clone)]
pub struct ChannelResolver {
    channels: HashMap<(String, String), RawChannel>,
}

impl ChannelResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, raw: RawChannel) {
        self.channels
            .insert((raw.communicator().to_string(), raw.name().to_string()), raw);
    }

    /// The raw primitive, after checking the communicator is catalogued.
    pub fn raw(&self, catalog: &Catalog, communicator: &str, channel: &str) -> Result<RawChannel> {
        catalog.get(communicator)?;
        self.channels
            .get(&(communicator.to_string(), channel.to_string()))
            .cloned()
            .ok_or_else(|| {
                Error::not_found(EntryKind::Channel, format!("{}.{}", communicator, channel))
            })
    }

    /// A handle for `role`. Dependent handles attribute calls to `caller`.
    pub fn resolve(
        &self,
        catalog: &Catalog,
        communicator: &str,
        channel: &str,
        role: Role,
        caller: &Caller,
    ) -> Result<ChannelHandle> {
        let raw = self.raw(catalog, communicator, channel)?;
        Ok(match role {
            Role::Authoritative => ChannelHandle::Raw(raw),
            Role::Dependent => {
                debug!(communicator = %communicator, channel = %channel, caller = %caller.id(), "creating channel proxy");
                ChannelHandle::Proxy(ChannelProxy::new(raw, caller.clone()))
            }
        })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
