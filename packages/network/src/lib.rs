//! Trellis network: communicators, role-aware channel handles and dispatch.
//!
//! A *communicator* groups named channels. Request channels answer each
//! invocation with a value; fire channels deliver a message and return
//! nothing. Communicators are declared once and shared by both sides of the
//! application:
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::{Folder, Value};
//! use trellis_network::{
//!     CommunicatorSource, LocalTransport, Network, NetworkConfig, Remote, Transport,
//! };
//! use trellis_packages::Side;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let shop = Folder::new("Communicators").with(
//!     "Shop",
//!     CommunicatorSource::new()
//!         .request("Price")
//!         .on_request("Price", |_caller, _args| Ok(Value::Integer(5))),
//! );
//!
//! let transport: Arc<dyn Transport> = Arc::new(LocalTransport::default());
//! let server = Network::new(transport.clone(), NetworkConfig::default(), Side::Server);
//! let client = Network::new(transport, NetworkConfig::default(), Side::Client);
//! server.append_communicators([shop.clone()]).unwrap();
//! client.append_communicators([shop]).unwrap();
//!
//! let price = client.channel("Shop", "Price").unwrap();
//! assert_eq!(price.invoke(vec![]).await.unwrap(), Value::Integer(5));
//! # });
//! ```
//!
//! The server side receives raw primitives and routes inbound traffic to the
//! bound actions through the [`Dispatcher`]. The client side receives
//! [`ChannelProxy`] handles that can only `invoke` and `send`.

mod caller;
mod catalog;
mod config;
mod definition;
mod dispatcher;
mod error;
mod handle;
mod local;
mod network;
mod resolver;
mod transport;

pub use caller::{Caller, CallerId};
pub use catalog::Catalog;
pub use config::NetworkConfig;
pub use definition::{Action, ChannelKind, ChannelSpec, CommunicatorDefinition, CommunicatorSource};
pub use dispatcher::{DispatchState, Dispatcher};
pub use error::{NetworkError, RemoteError, RemoteErrorKind, Result};
pub use handle::{ChannelHandle, ChannelProxy, Remote, Role};
pub use local::{LocalFire, LocalRequest, LocalTransport};
pub use network::{package, Network, PACKAGE_NAME};
pub use resolver::ChannelResolver;
pub use transport::{
    ConnectionId, FireListener, FirePrimitive, InvokeCallback, RawChannel, RequestPrimitive,
    Response, Transport,
};
