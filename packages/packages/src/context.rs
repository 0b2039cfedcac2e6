//! The host context handed to package initializers.

use std::any::{type_name, Any};
use std::sync::Arc;

use trellis_core::{Container, Error, Result};

use crate::config::HostConfig;
use crate::definition::PackageDefinition;
use crate::domain::Side;
use crate::handle::PackageHandle;
use crate::registry::{PackageInfo, PackageRegistry};

struct HostInner {
    config: HostConfig,
    packages: PackageRegistry,
}

/// Entry point for package registration and resolution.
///
/// The context is cheap to clone; clones share the same registry. It is
/// passed by reference to every initialization hook, so hooks can resolve
/// the packages they depend on.
#[derive(Clone)]
pub struct HostContext {
    inner: Arc<HostInner>,
}

impl HostContext {
    pub fn new(config: HostConfig) -> Self {
        Self {
            inner: Arc::new(HostInner {
                config,
                packages: PackageRegistry::new(),
            }),
        }
    }

    pub fn side(&self) -> Side {
        self.inner.config.side
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &PackageRegistry {
        &self.inner.packages
    }

    /// Register packages from containers. See
    /// [`PackageRegistry::register_containers`].
    pub fn append_packages<I>(&self, containers: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Container<Entry = PackageDefinition>,
    {
        self.inner.packages.register_containers(containers)
    }

    /// Resolve a package by name, initializing it if needed.
    pub fn resolve(&self, name: &str) -> Result<PackageHandle> {
        self.inner.packages.resolve(name, self)
    }

    /// Resolve a package and downcast it to `T`.
    pub fn resolve_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve(name)?
            .downcast::<T>()
            .ok_or_else(|| Error::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Initialize a package now, during the initializer phase.
    ///
    /// For singletons the instance is cached and later `resolve` calls return
    /// it. For other packages this only runs the hook once.
    pub fn init_package(&self, name: &str) -> Result<()> {
        self.resolve(name).map(drop)
    }

    pub fn packages(&self) -> Vec<PackageInfo> {
        self.inner.packages.list()
    }

    /// Close package registration.
    pub fn seal(&self) {
        self.inner.packages.seal();
    }
}
