//! Host-supplied namespaces.
//!
//! The registries never look inside the host's own hierarchy. They only ask a
//! container for its immediate children, so any directory-like structure can
//! feed them by implementing [`Container`].

/// A named namespace that can enumerate its immediate children.
///
/// Entries are returned in discovery order. Registration walks the top level
/// only; nested containers are not descended into.
pub trait Container {
    /// The value stored under each child name.
    type Entry;

    /// Name of the container, used in log output.
    fn name(&self) -> &str;

    /// List `(name, entry)` pairs for every immediate child.
    fn list_children(&self) -> Vec<(String, Self::Entry)>;
}

impl<C: Container + ?Sized> Container for &C {
    type Entry = C::Entry;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn list_children(&self) -> Vec<(String, Self::Entry)> {
        (**self).list_children()
    }
}

impl<C: Container + ?Sized> Container for Box<C> {
    type Entry = C::Entry;

    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn list_children(&self) -> Vec<(String, Self::Entry)> {
        self.as_ref().list_children()
    }
}

/// An in-memory container that keeps children in insertion order.
///
/// A folder may hold the same child name twice; registries reject that when
/// the folder is registered.
#[derive(Clone, Debug)]
pub struct Folder<T> {
    name: String,
    children: Vec<(String, T)>,
}

impl<T> Folder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Add a child, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, entry: T) -> Self {
        self.insert(name, entry);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: T) {
        self.children.push((name.into(), entry));
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl<T: Clone> Container for Folder<T> {
    type Entry = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn list_children(&self) -> Vec<(String, T)> {
        self.children.clone()
    }
}
