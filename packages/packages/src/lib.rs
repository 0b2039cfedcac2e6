//! Trellis packages: discovery, lazy initialization and caching of shared
//! code units.
//!
//! A *package* is any value registered under a name. It may be marked as a
//! singleton, restricted to one side of the application, and given an
//! initialization hook that receives the [`HostContext`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::Folder;
//! use trellis_packages::{HostConfig, HostContext, Instance, PackageDefinition};
//!
//! struct Counter {
//!     start: i64,
//! }
//!
//! let host = HostContext::new(HostConfig::default());
//! host.append_packages([Folder::new("Shared").with(
//!     "Counter",
//!     PackageDefinition::new(())
//!         .singleton(true)
//!         .with_initializer(|_ctx| Ok(Arc::new(Counter { start: 10 }) as Instance)),
//! )])
//! .unwrap();
//!
//! let counter = host.resolve_as::<Counter>("Counter").unwrap();
//! assert_eq!(counter.start, 10);
//! ```
//!
//! Resolution is lazy: nothing runs until the first `resolve`. Singleton
//! instances are cached for the lifetime of the registry; a failed hook leaves
//! the package unresolved so a later `resolve` can retry.

mod config;
mod context;
mod definition;
mod descriptor;
mod domain;
mod handle;
mod registry;

pub use config::HostConfig;
pub use context::HostContext;
pub use definition::{Initializer, Instance, PackageDefinition};
pub use descriptor::PackageState;
pub use domain::{Domain, Side};
pub use handle::PackageHandle;
pub use registry::{PackageInfo, PackageRegistry};

pub use trellis_core::{Error, Result};
