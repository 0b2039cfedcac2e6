//! The package registry: discovered descriptors keyed by name.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};
use trellis_core::{Container, EntryKind, Error, Name, Result};

use crate::context::HostContext;
use crate::definition::PackageDefinition;
use crate::descriptor::{PackageDescriptor, PackageState};
use crate::domain::Domain;
use crate::handle::PackageHandle;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Summary of a registered package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub state: PackageState,
    pub singleton: bool,
    pub domain: Domain,
}

#[derive(Default)]
struct Descriptors {
    by_name: HashMap<String, Arc<PackageDescriptor>>,
    /// Names in discovery order.
    order: Vec<String>,
}

/// Registry of packages discovered from containers.
///
/// Registration is all-or-nothing: if any entry in a call is invalid, no
/// entry from that call is added. After registration, the only mutable state
/// is each descriptor's lifecycle slot.
pub struct PackageRegistry {
    id: u64,
    descriptors: RwLock<Descriptors>,
    sealed: AtomicBool,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            descriptors: RwLock::new(Descriptors::default()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Register every immediate child of every container as a package.
    ///
    /// Returns the number of packages added. Fails with `DuplicateName` if a
    /// name repeats within this call or matches an earlier registration.
    pub fn register_containers<I>(&self, containers: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Container<Entry = PackageDefinition>,
    {
        if self.is_sealed() {
            return Err(Error::RegistrationClosed);
        }

        let mut descriptors = self.write();
        // `seal` takes the write lock, so this settles any race with it.
        if self.is_sealed() {
            return Err(Error::RegistrationClosed);
        }
        let mut seen = HashSet::new();
        let mut discovered = Vec::new();

        for container in containers {
            let children = container.list_children();
            debug!(
                container = container.name(),
                entries = children.len(),
                "walking package container"
            );
            for (name, definition) in children {
                Name::validate(&name)?;
                if descriptors.by_name.contains_key(&name) || !seen.insert(name.clone()) {
                    return Err(Error::duplicate(EntryKind::Package, name));
                }
                discovered.push((name, definition));
            }
        }

        let added = discovered.len();
        for (name, definition) in discovered {
            let descriptor = PackageDescriptor::new(self.id, name.clone(), definition);
            descriptors.order.push(name.clone());
            descriptors.by_name.insert(name, Arc::new(descriptor));
        }

        info!(added, total = descriptors.order.len(), "registered packages");
        Ok(added)
    }

    /// Resolve a package on behalf of `ctx`.
    pub(crate) fn resolve(&self, name: &str, ctx: &HostContext) -> Result<PackageHandle> {
        let descriptor = self.descriptor(name)?;

        let domain = descriptor.definition().package_domain();
        if !domain.allows(ctx.side()) {
            return Err(Error::DomainMismatch {
                name: name.to_string(),
                domain: domain.to_string(),
                side: ctx.side().to_string(),
            });
        }

        let instance = descriptor.resolve(ctx)?;
        Ok(PackageHandle::new(descriptor.name(), instance))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().by_name.contains_key(name)
    }

    /// Lifecycle state of a package, or `None` if it is not registered.
    pub fn state(&self, name: &str) -> Option<PackageState> {
        self.read().by_name.get(name).map(|d| d.state())
    }

    /// All packages in discovery order.
    pub fn list(&self) -> Vec<PackageInfo> {
        let descriptors = self.read();
        descriptors
            .order
            .iter()
            .filter_map(|name| descriptors.by_name.get(name))
            .map(|d| PackageInfo {
                name: d.name().to_string(),
                state: d.state(),
                singleton: d.definition().is_singleton(),
                domain: d.definition().package_domain(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close registration. Lookups keep working.
    ///
    /// Waits for a registration already in progress to finish.
    pub fn seal(&self) {
        let _descriptors = self.write();
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    // The registry lock is released before any hook runs, so hooks may
    // resolve other packages.
    fn descriptor(&self, name: &str) -> Result<Arc<PackageDescriptor>> {
        self.read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(EntryKind::Package, name))
    }

    fn read(&self) -> RwLockReadGuard<'_, Descriptors> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Descriptors> {
        self.descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PackageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;
    use trellis_core::Folder;

    fn folder(name: &str, entries: &[&str]) -> Folder<PackageDefinition> {
        entries.iter().fold(Folder::new(name), |f, entry| {
            f.with(*entry, PackageDefinition::new(entry.to_string()))
        })
    }

    #[test]
    fn registers_children_in_discovery_order() {
        let registry = PackageRegistry::new();
        let added = registry
            .register_containers([folder("Shared", &["B", "A"]), folder("Server", &["C"])])
            .unwrap();

        assert_eq!(added, 3);
        let names: Vec<_> = registry.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert!(registry.contains("C"));
        assert_eq!(registry.state("A"), Some(PackageState::Unresolved));
    }

    #[test]
    fn duplicate_across_containers_is_rejected_atomically() {
        let registry = PackageRegistry::new();
        let err = registry
            .register_containers([folder("One", &["A", "B"]), folder("Two", &["B"])])
            .unwrap_err();

        assert!(matches!(
            err,
            Error::DuplicateName {
                kind: EntryKind::Package,
                ..
            }
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_across_calls_is_rejected() {
        let registry = PackageRegistry::new();
        registry.register_containers([folder("One", &["A"])]).unwrap();
        let err = registry
            .register_containers([folder("Two", &["Z", "A"])])
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateName { .. }));
        assert!(!registry.contains("Z"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let registry = PackageRegistry::new();
        let err = registry
            .register_containers([folder("Bad", &["not a name"])])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }

    #[test]
    fn sealed_registry_refuses_registration() {
        let registry = PackageRegistry::new();
        registry.seal();
        let err = registry
            .register_containers([folder("Late", &["A"])])
            .unwrap_err();
        assert!(matches!(err, Error::RegistrationClosed));
    }

    /// Parks inside `list_children` until released.
    struct Gate {
        entered: mpsc::Sender<()>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Container for Gate {
        type Entry = PackageDefinition;

        fn name(&self) -> &str {
            "Gate"
        }

        fn list_children(&self) -> Vec<(String, PackageDefinition)> {
            self.entered.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            vec![("Inside".to_string(), PackageDefinition::new(()))]
        }
    }

    #[test]
    fn seal_waits_for_registration_in_progress() {
        let registry = PackageRegistry::new();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Gate {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        };
        let sealed = AtomicBool::new(false);

        std::thread::scope(|s| {
            let registering = s.spawn(|| registry.register_containers([&gate]));
            entered_rx.recv().unwrap();

            let sealing = s.spawn(|| {
                registry.seal();
                sealed.store(true, Ordering::SeqCst);
            });
            std::thread::sleep(Duration::from_millis(50));
            assert!(!sealed.load(Ordering::SeqCst));

            release_tx.send(()).unwrap();
            assert_eq!(registering.join().unwrap().unwrap(), 1);
            sealing.join().unwrap();
        });

        assert!(registry.is_sealed());
        assert!(registry.contains("Inside"));
        assert!(matches!(
            registry.register_containers([folder("Late", &["A"])]),
            Err(Error::RegistrationClosed)
        ));
    }

    #[test]
    fn unknown_state_is_none() {
        assert_eq!(PackageRegistry::new().state("Missing"), None);
    }
}
