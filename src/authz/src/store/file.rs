//! Compiled-file graph store
//!
//! The whole graph lives in one versioned JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "items": {
//!     "editor": { "kind": "role", "description": "", "order": 0,
//!                 "rule": null, "children": ["create_post", "user"] }
//!   },
//!   "assignments": { "42": ["editor"] }
//! }
//! ```
//!
//! The file is parsed once by [`GraphStore::load`]. Every committed mutation
//! rewrites the document through a temporary file in the same directory that
//! is then renamed over the original, so readers never observe a torn write.

use super::{GraphStore, Mutation, Snapshot};
use crate::error::{AuthzError, Result};
use crate::types::{Item, ItemKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current document format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompiledItem {
    kind: ItemKind,

    #[serde(default)]
    description: String,

    #[serde(default)]
    order: i32,

    #[serde(default)]
    rule: Option<String>,

    #[serde(default)]
    children: Vec<String>,
}

/// On-disk document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompiledGraph {
    version: u32,

    #[serde(default)]
    items: BTreeMap<String, CompiledItem>,

    #[serde(default)]
    assignments: BTreeMap<String, Vec<String>>,
}

impl CompiledGraph {
    fn from_snapshot(snapshot: &Snapshot) -> Self {
        let items = snapshot
            .graph
            .items(None)
            .into_iter()
            .map(|item| {
                let compiled = CompiledItem {
                    kind: item.kind,
                    description: item.description.clone(),
                    order: item.order,
                    rule: item.rule.clone(),
                    children: snapshot
                        .graph
                        .children(&item.name)
                        .map(str::to_string)
                        .collect(),
                };
                (item.name.clone(), compiled)
            })
            .collect();

        let mut assignments: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (principal, item) in snapshot.assignments.iter() {
            assignments
                .entry(principal.to_string())
                .or_default()
                .push(item.to_string());
        }

        Self {
            version: FORMAT_VERSION,
            items,
            assignments,
        }
    }

    fn into_snapshot(self) -> Result<Snapshot> {
        if self.version != FORMAT_VERSION {
            return Err(AuthzError::Backend(format!(
                "unsupported compiled graph version {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }

        let mut items = Vec::with_capacity(self.items.len());
        let mut edges = Vec::new();
        for (name, compiled) in self.items {
            for child in compiled.children {
                edges.push((name.clone(), child));
            }
            items.push(Item {
                name,
                kind: compiled.kind,
                description: compiled.description,
                order: compiled.order,
                rule: compiled.rule,
            });
        }

        let assignments = self.assignments.into_iter().flat_map(|(principal, items)| {
            items
                .into_iter()
                .map(move |item| (principal.clone(), item))
        });

        Snapshot::from_parts(items, edges, assignments)
    }
}

/// Graph store backed by a compiled JSON file
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    create_if_missing: bool,
}

impl FileStore {
    /// Store reading and writing `path`; the file must exist at load time
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create_if_missing: false,
        }
    }

    /// Treat a missing file as an empty graph
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `snapshot` as the full document
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let document = CompiledGraph::from_snapshot(snapshot);
        let bytes = serde_json::to_vec_pretty(&document)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| AuthzError::Backend(format!("write task failed: {}", e)))??;

        debug!(
            "Wrote compiled graph to {:?} ({} items, {} assignments)",
            self.path,
            snapshot.graph.len(),
            snapshot.assignments.len()
        );
        Ok(())
    }
}

#[async_trait]
impl GraphStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self) -> Result<Snapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.create_if_missing => {
                info!("Compiled graph {:?} not found, starting empty", self.path);
                return Ok(Snapshot::new());
            }
            Err(e) => return Err(e.into()),
        };

        let document: CompiledGraph = serde_json::from_slice(&bytes)?;
        let snapshot = document.into_snapshot()?;

        info!(
            "Loaded compiled graph from {:?}: {} items, {} assignments",
            self.path,
            snapshot.graph.len(),
            snapshot.assignments.len()
        );
        Ok(snapshot)
    }

    async fn apply(&self, mutation: &Mutation, after: &Snapshot) -> Result<()> {
        debug!("Persisting {} to {:?}", mutation.name(), self.path);
        self.save(after).await
    }
}

/// Write `bytes` to a temporary sibling of `path`, then rename it into place
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| AuthzError::Io(e.error))?;

    Ok(())
}
