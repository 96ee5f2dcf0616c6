//! Item graph: roles and permissions connected by parent → child edges
//!
//! The graph owns every [`Item`] and the directed edges between them. Only
//! roles may be parents. Every edge insertion is checked against the existing
//! edges so the graph stays acyclic:
//!
//! 1. both endpoints must exist
//! 2. the parent must be a role
//! 3. the edge must not already exist and must not be a self-loop
//! 4. the parent must not be reachable from the child
//!
//! A rejected insertion leaves the graph untouched.

use crate::error::{AuthzError, Result};
use crate::types::{Item, ItemKind, ItemName, ItemPatch};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Graph node holding an item and its adjacency
#[derive(Debug, Clone)]
struct GraphNode {
    item: Item,

    /// Immediate children (edges this node is the parent of)
    children: BTreeSet<ItemName>,

    /// Immediate parents (reverse edges)
    parents: BTreeSet<ItemName>,
}

impl GraphNode {
    fn new(item: Item) -> Self {
        Self {
            item,
            children: BTreeSet::new(),
            parents: BTreeSet::new(),
        }
    }
}

/// Directed acyclic graph of authorization items
///
/// # Example
///
/// ```
/// use rolegate_authz::{Item, ItemGraph};
///
/// let mut graph = ItemGraph::new();
/// graph.add_item(Item::role("editor")).unwrap();
/// graph.add_item(Item::permission("create_post")).unwrap();
/// graph.add_edge("editor", "create_post").unwrap();
///
/// assert!(graph.reachable("editor", "create_post"));
/// assert!(graph.add_edge("create_post", "editor").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ItemGraph {
    nodes: HashMap<ItemName, GraphNode>,
}

impl ItemGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item
    ///
    /// # Errors
    ///
    /// Returns an error if the item is invalid or the name is taken.
    pub fn add_item(&mut self, item: Item) -> Result<()> {
        item.validate()?;

        if self.nodes.contains_key(&item.name) {
            return Err(AuthzError::DuplicateItem(item.name));
        }

        self.nodes.insert(item.name.clone(), GraphNode::new(item));
        Ok(())
    }

    /// Update the mutable attributes of an item
    ///
    /// Rule changes never affect the graph shape, so no structural checks run.
    pub fn update_item(&mut self, name: &str, patch: &ItemPatch) -> Result<Item> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| AuthzError::NotFound(name.to_string()))?;

        let mut updated = node.item.clone();
        patch.apply_to(&mut updated);
        updated.validate()?;
        node.item = updated.clone();

        Ok(updated)
    }

    /// Remove an item together with all incident edges
    ///
    /// Assignments referencing the item live outside the graph; the engine
    /// removes them in the same mutation.
    pub fn remove_item(&mut self, name: &str) -> Result<Item> {
        let node = self
            .nodes
            .remove(name)
            .ok_or_else(|| AuthzError::NotFound(name.to_string()))?;

        for parent in &node.parents {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.remove(name);
            }
        }
        for child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parents.remove(name);
            }
        }

        Ok(node.item)
    }

    /// Add a parent → child edge
    ///
    /// # Errors
    ///
    /// - `NotFound` if either endpoint does not exist
    /// - `Structural` if the parent is not a role, the edge is a self-loop,
    ///   the edge already exists, or the edge would close a cycle
    pub fn add_edge(&mut self, parent: &str, child: &str) -> Result<()> {
        self.validate_edge(parent, child)?;

        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.insert(child.to_string());
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parents.insert(parent.to_string());
        }

        Ok(())
    }

    /// Check that `parent → child` may be inserted without changing the graph
    pub fn validate_edge(&self, parent: &str, child: &str) -> Result<()> {
        let parent_node = self
            .nodes
            .get(parent)
            .ok_or_else(|| AuthzError::NotFound(parent.to_string()))?;

        if !self.nodes.contains_key(child) {
            return Err(AuthzError::NotFound(child.to_string()));
        }

        if parent_node.item.kind != ItemKind::Role {
            return Err(AuthzError::Structural(format!(
                "'{}' is a {} and cannot have children",
                parent, parent_node.item.kind
            )));
        }

        if parent == child {
            return Err(AuthzError::Structural(format!(
                "'{}' cannot be a child of itself",
                parent
            )));
        }

        if parent_node.children.contains(child) {
            return Err(AuthzError::Structural(format!(
                "'{}' is already a child of '{}'",
                child, parent
            )));
        }

        // Adding parent -> child closes a cycle iff parent is reachable from child
        if let Some(path) = self.find_path(child, parent) {
            let cycle: Vec<&str> = std::iter::once(parent)
                .chain(path.iter().map(String::as_str))
                .collect();
            return Err(AuthzError::Structural(format!(
                "Circular dependency detected: {}",
                cycle.join(" -> ")
            )));
        }

        Ok(())
    }

    /// Remove a parent → child edge
    pub fn remove_edge(&mut self, parent: &str, child: &str) -> Result<()> {
        if !self.nodes.contains_key(child) {
            return Err(AuthzError::NotFound(child.to_string()));
        }

        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| AuthzError::NotFound(parent.to_string()))?;

        if !parent_node.children.remove(child) {
            return Err(AuthzError::Structural(format!(
                "'{}' is not a child of '{}'",
                child, parent
            )));
        }

        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.parents.remove(parent);
        }

        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.nodes.get(name).map(|node| &node.item)
    }

    pub fn has_edge(&self, parent: &str, child: &str) -> bool {
        self.nodes
            .get(parent)
            .map(|node| node.children.contains(child))
            .unwrap_or(false)
    }

    /// Immediate children of an item (empty for unknown items)
    pub fn children(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|node| node.children.iter().map(String::as_str))
    }

    /// Immediate parents of an item (empty for unknown items)
    pub fn parents(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|node| node.parents.iter().map(String::as_str))
    }

    /// True if `to == from` or `to` is reachable from `from` via child edges
    pub fn reachable(&self, from: &str, to: &str) -> bool {
        self.contains(from) && self.contains(to) && self.find_path(from, to).is_some()
    }

    /// Some path `from → … → to` (both ends included), if one exists
    pub fn find_path(&self, from: &str, to: &str) -> Option<Vec<ItemName>> {
        if from == to {
            return self.contains(from).then(|| vec![from.to_string()]);
        }

        // Iterative DFS keeping the current path on the stack
        let mut visited: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = vec![from];
        let mut frontier: Vec<Vec<&str>> = vec![self.children(from).collect()];
        visited.insert(from);

        while let Some(pending) = frontier.last_mut() {
            let Some(next) = pending.pop() else {
                frontier.pop();
                path.pop();
                continue;
            };

            if next == to {
                path.push(next);
                return Some(path.into_iter().map(str::to_string).collect());
            }

            if visited.insert(next) {
                path.push(next);
                frontier.push(self.children(next).collect());
            }
        }

        None
    }

    /// Items of the given kind (all kinds when `None`), ordered by (order, name)
    pub fn items(&self, kind: Option<ItemKind>) -> Vec<&Item> {
        let mut items: Vec<&Item> = self
            .nodes
            .values()
            .map(|node| &node.item)
            .filter(|item| kind.map_or(true, |k| item.kind == k))
            .collect();
        items.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        items
    }

    /// All edges as (parent, child), sorted
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .nodes
            .iter()
            .flat_map(|(parent, node)| {
                node.children
                    .iter()
                    .map(move |child| (parent.as_str(), child.as_str()))
            })
            .collect();
        edges.sort_unstable();
        edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
