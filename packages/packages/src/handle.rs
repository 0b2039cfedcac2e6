//! Handles returned by package resolution.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::definition::Instance;

/// A resolved package.
///
/// Cloning a handle is cheap; clones share the same instance.
#[derive(Clone)]
pub struct PackageHandle {
    name: Arc<str>,
    instance: Instance,
}

impl PackageHandle {
    pub(crate) fn new(name: &str, instance: Instance) -> Self {
        Self {
            name: Arc::from(name),
            instance,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Downcast to the concrete package type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instance.clone().downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.instance.is::<T>()
    }

    /// True when both handles point at the same instance.
    pub fn ptr_eq(&self, other: &PackageHandle) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for PackageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
