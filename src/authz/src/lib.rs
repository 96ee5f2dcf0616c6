//! # Rolegate Authorization Engine
//!
//! Hierarchical role-based access control: roles and permissions form a
//! directed acyclic graph, principals are granted items directly, and a
//! principal holds an item iff some granted item reaches it through edges
//! whose business rules all pass.
//!
//! ## Features
//!
//! - **Cycle-free item graph** validated on every edge insertion
//! - **Business rules** registered by kind name, fail-closed
//! - **Two interchangeable stores**: a compiled JSON file and SQLite via sqlx
//! - **Decision cache** keyed on (principal, item, params, identity), cleared
//!   on every mutation
//!
//! ## Example
//!
//! ```rust
//! use rolegate_authz::{AuthorizationEngine, EngineConfig, FileStore, Item, Params};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = tempfile::tempdir()?;
//!     let store = Arc::new(FileStore::new(dir.path().join("rbac.json")).create_if_missing(true));
//!     let engine = AuthorizationEngine::new(EngineConfig::default(), store).await?;
//!
//!     engine.add_item(Item::role("admin")).await?;
//!     engine.add_item(Item::role("editor")).await?;
//!     engine.add_item(Item::permission("delete_post")).await?;
//!     engine.add_child("admin", "editor").await?;
//!     engine.add_child("admin", "delete_post").await?;
//!     engine.assign("1", "admin").await?;
//!
//!     if engine.check("1", "delete_post", &Params::new())? {
//!         println!("Access granted!");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod assignment;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod rules;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use assignment::AssignmentStore;
pub use config::{BackendSettings, CacheSettings, EngineSettings};
pub use engine::{AuthorizationEngine, CacheConfig, CacheStats, EngineConfig};
pub use error::{AuthzError, Result};
pub use graph::ItemGraph;
pub use rules::{
    BusinessRule, IdentityProvider, ParamEquals, RuleContext, RuleError, RuleEvaluator,
    SessionIdentity,
};
pub use store::{FileStore, GraphStore, Mutation, Snapshot};
#[cfg(feature = "sql")]
pub use store::SqlStore;
pub use types::{Item, ItemKind, ItemName, ItemPatch, Params, PrincipalId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
