//! Direct grants of items to principals
//!
//! Policy applied uniformly by the engine and every graph store: assigning an
//! already assigned item is a no-op, revoking a grant that does not exist is a
//! [`AuthzError::NotAssigned`] error.

use crate::error::{AuthzError, Result};
use crate::graph::ItemGraph;
use crate::types::{ItemName, PrincipalId};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct AssignmentStore {
    grants: HashMap<PrincipalId, BTreeSet<ItemName>>,
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `item` to `principal`
    ///
    /// Returns `true` if the grant is new, `false` if it already existed.
    pub fn assign(&mut self, graph: &ItemGraph, principal: &str, item: &str) -> Result<bool> {
        if !graph.contains(item) {
            return Err(AuthzError::NotFound(item.to_string()));
        }

        Ok(self
            .grants
            .entry(principal.to_string())
            .or_default()
            .insert(item.to_string()))
    }

    /// Remove a single grant
    pub fn revoke(&mut self, graph: &ItemGraph, principal: &str, item: &str) -> Result<()> {
        if !graph.contains(item) {
            return Err(AuthzError::NotFound(item.to_string()));
        }

        let removed = match self.grants.get_mut(principal) {
            Some(items) => {
                let removed = items.remove(item);
                if items.is_empty() {
                    self.grants.remove(principal);
                }
                removed
            }
            None => false,
        };

        if !removed {
            return Err(AuthzError::NotAssigned {
                principal: principal.to_string(),
                item: item.to_string(),
            });
        }

        Ok(())
    }

    /// Remove every grant of a principal, returning how many were removed
    pub fn revoke_all(&mut self, principal: &str) -> usize {
        self.grants
            .remove(principal)
            .map(|items| items.len())
            .unwrap_or(0)
    }

    /// Drop every grant of `item` (cascade of an item deletion)
    pub fn remove_item(&mut self, item: &str) -> usize {
        let mut removed = 0;
        self.grants.retain(|_, items| {
            if items.remove(item) {
                removed += 1;
            }
            !items.is_empty()
        });
        removed
    }

    /// Directly assigned items of a principal
    pub fn items_of(&self, principal: &str) -> Option<&BTreeSet<ItemName>> {
        self.grants.get(principal)
    }

    pub fn is_assigned(&self, principal: &str, item: &str) -> bool {
        self.grants
            .get(principal)
            .map(|items| items.contains(item))
            .unwrap_or(false)
    }

    /// Principals holding a direct grant of `item`, sorted
    pub fn principals_of(&self, item: &str) -> Vec<&str> {
        let mut principals: Vec<&str> = self
            .grants
            .iter()
            .filter(|(_, items)| items.contains(item))
            .map(|(principal, _)| principal.as_str())
            .collect();
        principals.sort_unstable();
        principals
    }

    /// All grants as (principal, item), sorted
    pub fn iter(&self) -> Vec<(&str, &str)> {
        let mut grants: Vec<(&str, &str)> = self
            .grants
            .iter()
            .flat_map(|(principal, items)| {
                items
                    .iter()
                    .map(move |item| (principal.as_str(), item.as_str()))
            })
            .collect();
        grants.sort_unstable();
        grants
    }

    pub fn len(&self) -> usize {
        self.grants.values().map(|items| items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Item;

    fn graph() -> ItemGraph {
        let mut graph = ItemGraph::new();
        graph.add_item(Item::role("editor")).unwrap();
        graph.add_item(Item::permission("read")).unwrap();
        graph
    }

    #[test]
    fn test_assign_is_idempotent() {
        let graph = graph();
        let mut store = AssignmentStore::new();

        assert!(store.assign(&graph, "42", "editor").unwrap());
        assert!(!store.assign(&graph, "42", "editor").unwrap());
        assert_eq!(store.items_of("42").unwrap().len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_assign_unknown_item() {
        let graph = graph();
        let mut store = AssignmentStore::new();

        let result = store.assign(&graph, "42", "ghost");
        assert!(matches!(result, Err(AuthzError::NotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_revoke_policy() {
        let graph = graph();
        let mut store = AssignmentStore::new();

        store.assign(&graph, "42", "editor").unwrap();
        store.revoke(&graph, "42", "editor").unwrap();
        assert!(!store.is_assigned("42", "editor"));
        assert!(store.items_of("42").is_none());

        assert!(matches!(
            store.revoke(&graph, "42", "editor"),
            Err(AuthzError::NotAssigned { .. })
        ));
        assert!(matches!(
            store.revoke(&graph, "7", "read"),
            Err(AuthzError::NotAssigned { .. })
        ));
        assert!(matches!(
            store.revoke(&graph, "42", "ghost"),
            Err(AuthzError::NotFound(_))
        ));
    }

    #[test]
    fn test_revoke_all_and_cascade() {
        let graph = graph();
        let mut store = AssignmentStore::new();

        store.assign(&graph, "1", "editor").unwrap();
        store.assign(&graph, "1", "read").unwrap();
        store.assign(&graph, "2", "read").unwrap();

        assert_eq!(store.principals_of("read"), vec!["1", "2"]);
        assert_eq!(store.remove_item("read"), 2);
        assert!(store.items_of("2").is_none());

        assert_eq!(store.revoke_all("1"), 1);
        assert_eq!(store.revoke_all("1"), 0);
        assert!(store.is_empty());
    }
}
