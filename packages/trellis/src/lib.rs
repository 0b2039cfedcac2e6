//! Trellis: shared packages and network communicators for client/server
//! applications.
//!
//! Trellis is layered. Each layer is a separate crate, re-exported here:
//!
//! - [`trellis_core`]: names, the `Value` tree, containers and the shared
//!   error type
//! - [`trellis_packages`]: the package registry and host context
//! - [`trellis_network`]: communicators, channel handles and dispatch
//!
//! A [`Trellis`] is one side of the application. Two hosts built over the same
//! transport form a server/client pair:
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let transport: Arc<dyn Transport> = Arc::new(LocalTransport::default());
//! let server = Trellis::new(TrellisConfig::server(), transport.clone()).unwrap();
//! let client = Trellis::new(TrellisConfig::client(), transport).unwrap();
//!
//! let tools = Folder::new("Communicators").with(
//!     "Tools",
//!     CommunicatorSource::new()
//!         .request("Echo")
//!         .on_request("Echo", |_caller, mut args| Ok(args.pop().unwrap_or_default())),
//! );
//! server.append_communicators([tools.clone()]).unwrap();
//! client.append_communicators([tools]).unwrap();
//!
//! let echo = client.network().channel("Tools", "Echo").unwrap();
//! assert_eq!(echo.invoke(vec![Value::Integer(42)]).await.unwrap(), Value::Integer(42));
//! # });
//! ```

mod bootstrap;
mod config;

pub use bootstrap::Trellis;
pub use config::TrellisConfig;

pub use trellis_core;
pub use trellis_network;
pub use trellis_packages;

/// The types most applications need.
pub mod prelude {
    pub use crate::{Trellis, TrellisConfig};
    pub use trellis_core::{Container, Error, Folder, Value};
    pub use trellis_network::{
        Caller, ChannelHandle, ChannelKind, CommunicatorSource, LocalTransport, Network,
        NetworkConfig, NetworkError, Remote, Role, Transport,
    };
    pub use trellis_packages::{
        Domain, HostConfig, HostContext, Instance, PackageDefinition, PackageHandle, Side,
    };
}
