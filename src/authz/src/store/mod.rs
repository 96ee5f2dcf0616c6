//! Graph storage backends
//!
//! Both backends materialize into the same [`Snapshot`] through
//! [`Snapshot::from_parts`], so authorization semantics cannot drift between
//! them. Validation of a mutation always happens in memory, against the
//! engine's snapshot, before the backend is asked to persist it.

pub mod file;
#[cfg(feature = "sql")]
pub mod sql;

pub use file::FileStore;
#[cfg(feature = "sql")]
pub use sql::SqlStore;

use crate::assignment::AssignmentStore;
use crate::error::Result;
use crate::graph::ItemGraph;
use crate::types::{Item, ItemName, ItemPatch, PrincipalId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Loaded graph and assignments
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub graph: ItemGraph,
    pub assignments: AssignmentStore,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from flat rows, validating every reference
    ///
    /// Fails on the first invalid item, dangling edge endpoint, cycle or
    /// dangling assignment; no partially built snapshot is ever returned.
    pub fn from_parts<E, A>(items: Vec<Item>, edges: E, assignments: A) -> Result<Self>
    where
        E: IntoIterator<Item = (ItemName, ItemName)>,
        A: IntoIterator<Item = (PrincipalId, ItemName)>,
    {
        let mut graph = ItemGraph::new();
        for item in items {
            graph.add_item(item)?;
        }
        for (parent, child) in edges {
            graph.add_edge(&parent, &child)?;
        }

        let mut store = AssignmentStore::new();
        for (principal, item) in assignments {
            store.assign(&graph, &principal, &item)?;
        }

        Ok(Self {
            graph,
            assignments: store,
        })
    }

    /// Apply a mutation in memory
    ///
    /// Returns whether anything changed. On error the snapshot is untouched.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<bool> {
        match mutation {
            Mutation::AddItem(item) => {
                self.graph.add_item(item.clone())?;
                Ok(true)
            }
            Mutation::UpdateItem { name, patch } => {
                self.graph.update_item(name, patch)?;
                Ok(true)
            }
            Mutation::RemoveItem { name } => {
                self.graph.remove_item(name)?;
                self.assignments.remove_item(name);
                Ok(true)
            }
            Mutation::AddChild { parent, child } => {
                self.graph.add_edge(parent, child)?;
                Ok(true)
            }
            Mutation::RemoveChild { parent, child } => {
                self.graph.remove_edge(parent, child)?;
                Ok(true)
            }
            Mutation::Assign { principal, item } => {
                self.assignments.assign(&self.graph, principal, item)
            }
            Mutation::Revoke { principal, item } => {
                self.assignments.revoke(&self.graph, principal, item)?;
                Ok(true)
            }
            Mutation::RevokeAll { principal } => Ok(self.assignments.revoke_all(principal) > 0),
        }
    }
}

/// Administrative change to the graph or the assignments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddItem(Item),
    UpdateItem { name: ItemName, patch: ItemPatch },
    RemoveItem { name: ItemName },
    AddChild { parent: ItemName, child: ItemName },
    RemoveChild { parent: ItemName, child: ItemName },
    Assign { principal: PrincipalId, item: ItemName },
    Revoke { principal: PrincipalId, item: ItemName },
    RevokeAll { principal: PrincipalId },
}

impl Mutation {
    /// Short operation name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::AddItem(_) => "add_item",
            Mutation::UpdateItem { .. } => "update_item",
            Mutation::RemoveItem { .. } => "remove_item",
            Mutation::AddChild { .. } => "add_child",
            Mutation::RemoveChild { .. } => "remove_child",
            Mutation::Assign { .. } => "assign",
            Mutation::Revoke { .. } => "revoke",
            Mutation::RevokeAll { .. } => "revoke_all",
        }
    }
}

/// Persistence contract shared by every backend
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Materialize the full graph and assignments
    async fn load(&self) -> Result<Snapshot>;

    /// Persist one mutation that already succeeded against `after`
    ///
    /// `after` is the validated post-mutation snapshot. On error the engine
    /// keeps its previous snapshot.
    async fn apply(&self, mutation: &Mutation, after: &Snapshot) -> Result<()>;
}
