//! Wires a host context to its `Network` package.

use std::any::Any;
use std::sync::Arc;

use tracing::info;
use trellis_core::{Container, Folder, Result};
use trellis_network::{
    package, CommunicatorSource, LocalTransport, Network, Transport, PACKAGE_NAME,
};
use trellis_packages::{HostContext, PackageDefinition, PackageHandle, Side};

use crate::config::TrellisConfig;

/// One side of the application: a host context with the `Network` package
/// registered and initialized.
///
/// Packages resolve `Network` like any other package, so initializers can
/// reach channels through `ctx.resolve_as::<Network>("Network")`.
#[derive(Clone)]
pub struct Trellis {
    host: HostContext,
    network: Arc<Network>,
}

impl Trellis {
    /// Build a host over `transport`. Hosts that share a transport talk to
    /// each other.
    pub fn new(config: TrellisConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let host = HostContext::new(config.host);
        host.append_packages([Folder::new("Trellis")
            .with(PACKAGE_NAME, package(transport, config.network))])?;
        let network = host.resolve_as::<Network>(PACKAGE_NAME)?;
        info!(side = %host.side(), "trellis host ready");
        Ok(Self { host, network })
    }

    /// Build a host with its own in-process transport.
    pub fn with_local_transport(config: TrellisConfig) -> Result<Self> {
        let transport = Arc::new(LocalTransport::new(config.network.clone()));
        Self::new(config, transport)
    }

    pub fn side(&self) -> Side {
        self.host.side()
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn append_packages<I>(&self, containers: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Container<Entry = PackageDefinition>,
    {
        self.host.append_packages(containers)
    }

    pub fn append_communicators<I>(&self, containers: I) -> trellis_network::Result<usize>
    where
        I: IntoIterator,
        I::Item: Container<Entry = CommunicatorSource>,
    {
        self.network.append_communicators(containers)
    }

    pub fn resolve(&self, name: &str) -> Result<PackageHandle> {
        self.host.resolve(name)
    }

    pub fn resolve_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.host.resolve_as(name)
    }

    /// End the initializer phase: no more packages or communicators.
    pub fn seal(&self) {
        self.host.seal();
        self.network.seal();
    }
}
