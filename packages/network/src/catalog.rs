//! The communicator catalog: parsed definitions keyed by name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;
use trellis_core::{Container, EntryKind, Error, Result};

use crate::definition::{CommunicatorDefinition, CommunicatorSource};

/// Definitions in discovery order.
///
/// Registration happens in two steps: [`Catalog::prepare`] walks the
/// containers and validates everything without touching the catalog, and
/// [`Catalog::commit`] adds the prepared definitions. A failed `prepare`
/// leaves nothing behind.
#[derive(Default, Clone)]
pub struct Catalog {
    by_name: HashMap<String, Arc<CommunicatorDefinition>>,
    order: Vec<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every immediate child of every container.
    pub fn prepare<I>(&self, containers: I) -> Result<Vec<CommunicatorDefinition>>
    where
        I: IntoIterator,
        I::Item: Container<Entry = CommunicatorSource>,
    {
        let mut seen = HashSet::new();
        let mut prepared = Vec::new();

        for container in containers {
            let children = container.list_children();
            debug!(
                container = container.name(),
                entries = children.len(),
                "walking communicator container"
            );
            for (name, source) in children {
                let definition = source.parse(&name)?;
                if self.by_name.contains_key(&name) || !seen.insert(name.clone()) {
                    return Err(Error::duplicate(EntryKind::Communicator, name));
                }
                prepared.push(definition);
            }
        }
        Ok(prepared)
    }

    /// Add prepared definitions.
    pub fn commit(&mut self, definitions: Vec<CommunicatorDefinition>) {
        for definition in definitions {
            let name = definition.name().to_string();
            self.order.push(name.clone());
            self.by_name.insert(name, Arc::new(definition));
        }
    }

    pub fn get(&self, name: &str) -> Result<&Arc<CommunicatorDefinition>> {
        self.by_name
            .get(name)
            .ok_or_else(|| Error::not_found(EntryKind::Communicator, name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Names in discovery order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::{json as value_json, Folder};

    fn source(table: serde_json::Value) -> CommunicatorSource {
        CommunicatorSource::from_value(value_json::from_json(table))
    }

    #[test]
    fn prepare_then_commit() {
        let mut catalog = Catalog::new();
        let prepared = catalog
            .prepare([Folder::new("Communicators")
                .with("Shop", source(json!({"requests": {"remotes": ["Buy"]}})))
                .with("Chat", source(json!({"fires": {"remotes": ["Say"]}})))])
            .unwrap();
        assert!(catalog.is_empty());

        catalog.commit(prepared);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("Shop").unwrap().requests()[0].name(), "Buy");
        assert!(catalog.contains("Chat"));
    }

    #[test]
    fn unknown_communicator() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.get("Ghost"),
            Err(Error::NotFound {
                kind: EntryKind::Communicator,
                ..
            })
        ));
    }

    #[test]
    fn duplicates_within_and_across_calls() {
        let mut catalog = Catalog::new();
        let err = catalog
            .prepare([
                Folder::new("A").with("Shop", CommunicatorSource::new()),
                Folder::new("B").with("Shop", CommunicatorSource::new()),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName { .. }));

        let prepared = catalog
            .prepare([Folder::new("A").with("Shop", CommunicatorSource::new())])
            .unwrap();
        catalog.commit(prepared);
        let err = catalog
            .prepare([Folder::new("B").with("Shop", CommunicatorSource::new())])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName { .. }));
    }

    #[test]
    fn names_keep_discovery_order() {
        let mut catalog = Catalog::new();
        let prepared = catalog
            .prepare([
                Folder::new("First").with("Zeta", CommunicatorSource::new()),
                Folder::new("Second").with("Alpha", CommunicatorSource::new()),
            ])
            .unwrap();
        catalog.commit(prepared);
        assert_eq!(catalog.names(), vec!["Zeta", "Alpha"]);
    }
}
