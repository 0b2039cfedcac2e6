//! Package definitions as discovered in containers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use trellis_core::BoxError;

use crate::context::HostContext;
use crate::domain::Domain;

/// A live package value. Resolved handles downcast it to the concrete type.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Initialization hook.
///
/// Runs synchronously on first resolve (every resolve for non-singletons). The
/// returned value replaces the raw package value. The hook must not block on
/// other threads that are themselves resolving packages.
pub type Initializer =
    Arc<dyn Fn(&HostContext) -> std::result::Result<Instance, BoxError> + Send + Sync>;

/// The raw form of a package: its value plus optional metadata.
#[derive(Clone)]
pub struct PackageDefinition {
    value: Instance,
    singleton: bool,
    domain: Domain,
    initializer: Option<Initializer>,
}

impl PackageDefinition {
    /// Define a package whose value is `value`.
    ///
    /// Without an initializer, resolving the package yields this value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_instance(Arc::new(value))
    }

    /// Define a package from an already shared value.
    pub fn from_instance(value: Instance) -> Self {
        Self {
            value,
            singleton: false,
            domain: Domain::Shared,
            initializer: None,
        }
    }

    /// Mark the package as a singleton: the resolved instance is cached.
    #[must_use]
    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    /// Restrict the package to a domain.
    #[must_use]
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// Attach an initialization hook.
    #[must_use]
    pub fn with_initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(&HostContext) -> std::result::Result<Instance, BoxError> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn package_domain(&self) -> Domain {
        self.domain
    }

    pub fn has_initializer(&self) -> bool {
        self.initializer.is_some()
    }

    /// The raw value as discovered.
    pub fn value(&self) -> &Instance {
        &self.value
    }

    pub(crate) fn initializer(&self) -> Option<&Initializer> {
        self.initializer.as_ref()
    }
}

impl fmt::Debug for PackageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageDefinition")
            .field("singleton", &self.singleton)
            .field("domain", &self.domain)
            .field("initializer", &self.initializer.is_some())
            .finish_non_exhaustive()
    }
}
