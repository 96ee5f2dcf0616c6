//! Authorization engine
//!
//! Answers "may principal P perform item I with parameters X?" against an
//! in-memory snapshot of the item graph and the assignments, and applies
//! administrative mutations through a [`GraphStore`].
//!
//! ```text
//! check ──► [DecisionCache] ──► PathSearch ──► RuleEvaluator
//!                                   │
//!                             Arc<Snapshot> ◄── swap ── mutation ──► GraphStore
//! ```
//!
//! `check` is synchronous and never does I/O. Mutations are serialized by a
//! single writer: each one is validated on a copy of the snapshot, persisted,
//! published, and then the decision cache is cleared.

pub mod cache;
mod check;

pub use cache::{CacheConfig, CacheStats, DecisionCache, DecisionKey};

use crate::error::{AuthzError, Result};
use crate::rules::{AnonymousIdentity, BusinessRule, IdentityProvider, RuleEvaluator};
use crate::store::{GraphStore, Mutation, Snapshot};
use crate::types::{Item, ItemKind, ItemName, ItemPatch, Params, PrincipalId};
use check::PathSearch;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Memoize decisions until the next mutation
    pub enable_cache: bool,

    /// Cache configuration
    pub cache_config: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_config: CacheConfig::default(),
        }
    }
}

/// Hierarchical role-based authorization engine
///
/// # Example
///
/// ```no_run
/// use rolegate_authz::{AuthorizationEngine, EngineConfig, FileStore, Item, Params};
/// use std::sync::Arc;
///
/// # async fn demo() -> rolegate_authz::Result<()> {
/// let store = Arc::new(FileStore::new("rbac.json").create_if_missing(true));
/// let engine = AuthorizationEngine::new(EngineConfig::default(), store).await?;
///
/// engine.add_item(Item::role("editor")).await?;
/// engine.add_item(Item::permission("create_post")).await?;
/// engine.add_child("editor", "create_post").await?;
/// engine.assign("42", "editor").await?;
///
/// assert!(engine.check("42", "create_post", &Params::new())?);
/// # Ok(())
/// # }
/// ```
pub struct AuthorizationEngine {
    /// Persistence backend
    store: Arc<dyn GraphStore>,

    /// Current graph and assignments, replaced wholesale on mutation
    snapshot: RwLock<Arc<Snapshot>>,

    /// Serializes mutations and reloads
    writer: Mutex<()>,

    /// Business rule registry
    rules: Arc<RuleEvaluator>,

    /// Source of the anonymous flag handed to rules
    identity: Arc<dyn IdentityProvider>,

    /// Memoized decisions
    cache: Option<DecisionCache>,

    config: EngineConfig,
}

impl AuthorizationEngine {
    /// Load the store and build an engine over it
    ///
    /// Fails if the stored graph does not validate; no engine is produced in
    /// that case.
    pub async fn new(config: EngineConfig, store: Arc<dyn GraphStore>) -> Result<Self> {
        let snapshot = store.load().await?;

        let cache = if config.enable_cache {
            Some(DecisionCache::new(config.cache_config.clone()))
        } else {
            None
        };

        info!(
            "AuthorizationEngine initialized from {} store: {} items, {} assignments, cache={}",
            store.name(),
            snapshot.graph.len(),
            snapshot.assignments.len(),
            config.enable_cache
        );

        Ok(Self {
            store,
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            rules: Arc::new(RuleEvaluator::new()),
            identity: Arc::new(AnonymousIdentity),
            cache,
            config,
        })
    }

    /// Use `identity` to decide whether checks run for an anonymous caller
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self.invalidate_cache();
        self
    }

    /// Replace the rule registry
    pub fn with_rules(mut self, rules: Arc<RuleEvaluator>) -> Self {
        self.rules = rules;
        self.invalidate_cache();
        self
    }

    /// Register a business rule kind
    pub fn register_rule<R, F>(&self, kind: impl Into<String>, factory: F)
    where
        R: BusinessRule + 'static,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.rules.register(kind, factory);
        self.invalidate_cache();
    }

    pub fn rules(&self) -> &RuleEvaluator {
        &self.rules
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current snapshot; stays valid (and unchanged) after later mutations
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Whether `principal` holds `item` under `params`
    ///
    /// Unknown `item` is the only error; every rule failure denies.
    pub fn check(&self, principal: &str, item: &str, params: &Params) -> Result<bool> {
        let start = Instant::now();
        let anonymous = self.identity.is_anonymous();

        // Generation first, snapshot second: see DecisionCache::put
        let generation = self.cache.as_ref().map(|cache| cache.generation());
        let snapshot = self.snapshot();

        if !snapshot.graph.contains(item) {
            return Err(AuthzError::NotFound(item.to_string()));
        }

        let key = self
            .cache
            .as_ref()
            .map(|_| DecisionKey::new(principal, item, params, anonymous));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(allowed) = cache.get(key) {
                debug!(
                    "Cache hit: principal '{}' item '{}' -> {}",
                    principal, item, allowed
                );
                return Ok(allowed);
            }
        }

        let allowed = PathSearch::new(&snapshot, &self.rules, principal, item, params, anonymous)
            .run()?
            .is_some();

        if let (Some(cache), Some(key), Some(generation)) = (&self.cache, key, generation) {
            cache.put(generation, key, allowed);
        }

        debug!(
            "Checked principal '{}' item '{}' -> {} in {:?}",
            principal,
            item,
            allowed,
            start.elapsed()
        );
        Ok(allowed)
    }

    /// The path that grants `item`, `[assigned, …, item]`, or `None`
    ///
    /// Never cached.
    pub fn explain(
        &self,
        principal: &str,
        item: &str,
        params: &Params,
    ) -> Result<Option<Vec<ItemName>>> {
        let snapshot = self.snapshot();
        PathSearch::new(
            &snapshot,
            &self.rules,
            principal,
            item,
            params,
            self.identity.is_anonymous(),
        )
        .run()
    }

    pub fn get_item(&self, name: &str) -> Result<Item> {
        self.snapshot()
            .graph
            .get(name)
            .cloned()
            .ok_or_else(|| AuthzError::NotFound(name.to_string()))
    }

    /// Items of one kind (all when `None`), ordered by (order, name)
    pub fn all_items(&self, kind: Option<ItemKind>) -> Vec<Item> {
        self.snapshot()
            .graph
            .items(kind)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Immediate children of `name`
    pub fn children(&self, name: &str) -> Result<Vec<ItemName>> {
        let snapshot = self.snapshot();
        if !snapshot.graph.contains(name) {
            return Err(AuthzError::NotFound(name.to_string()));
        }
        Ok(snapshot.graph.children(name).map(str::to_string).collect())
    }

    /// Immediate parents of `name`
    pub fn parents(&self, name: &str) -> Result<Vec<ItemName>> {
        let snapshot = self.snapshot();
        if !snapshot.graph.contains(name) {
            return Err(AuthzError::NotFound(name.to_string()));
        }
        Ok(snapshot.graph.parents(name).map(str::to_string).collect())
    }

    /// Items directly assigned to `principal`, sorted
    pub fn items_of(&self, principal: &str) -> Vec<ItemName> {
        self.snapshot()
            .assignments
            .items_of(principal)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Principals holding a direct grant of `item`, sorted
    pub fn principals_of(&self, item: &str) -> Vec<PrincipalId> {
        self.snapshot()
            .assignments
            .principals_of(item)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn is_assigned(&self, principal: &str, item: &str) -> bool {
        self.snapshot().assignments.is_assigned(principal, item)
    }

    /// Grant `item` to `principal`; granting twice is a no-op
    pub async fn assign(&self, principal: &str, item: &str) -> Result<()> {
        self.mutate(Mutation::Assign {
            principal: principal.to_string(),
            item: item.to_string(),
        })
        .await
    }

    /// Remove a grant; fails with `NotAssigned` if it does not exist
    pub async fn revoke(&self, principal: &str, item: &str) -> Result<()> {
        self.mutate(Mutation::Revoke {
            principal: principal.to_string(),
            item: item.to_string(),
        })
        .await
    }

    /// Remove every grant of `principal`; succeeds when there are none
    pub async fn revoke_all(&self, principal: &str) -> Result<()> {
        self.mutate(Mutation::RevokeAll {
            principal: principal.to_string(),
        })
        .await
    }

    pub async fn add_item(&self, item: Item) -> Result<()> {
        self.mutate(Mutation::AddItem(item)).await
    }

    pub async fn update_item(&self, name: &str, patch: ItemPatch) -> Result<()> {
        self.mutate(Mutation::UpdateItem {
            name: name.to_string(),
            patch,
        })
        .await
    }

    /// Delete an item with all its edges and assignments
    pub async fn remove_item(&self, name: &str) -> Result<()> {
        self.mutate(Mutation::RemoveItem {
            name: name.to_string(),
        })
        .await
    }

    /// Add the edge `parent → child`, rejecting cycles
    pub async fn add_child(&self, parent: &str, child: &str) -> Result<()> {
        self.mutate(Mutation::AddChild {
            parent: parent.to_string(),
            child: child.to_string(),
        })
        .await
    }

    pub async fn remove_child(&self, parent: &str, child: &str) -> Result<()> {
        self.mutate(Mutation::RemoveChild {
            parent: parent.to_string(),
            child: child.to_string(),
        })
        .await
    }

    /// Re-read the store, replacing the snapshot
    pub async fn reload(&self) -> Result<()> {
        let _guard = self.writer.lock().await;

        let snapshot = self.store.load().await?;
        info!(
            "Reloaded {} store: {} items, {} assignments",
            self.store.name(),
            snapshot.graph.len(),
            snapshot.assignments.len()
        );

        *self.snapshot.write() = Arc::new(snapshot);
        self.invalidate_cache();
        Ok(())
    }

    /// Decision cache statistics, `None` when caching is disabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    /// Drop every memoized decision
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            debug!("Decision cache cleared");
        }
    }

    async fn mutate(&self, mutation: Mutation) -> Result<()> {
        let _guard = self.writer.lock().await;

        let mut next = Snapshot::clone(&self.snapshot());
        let changed = match next.apply(&mutation) {
            Ok(changed) => changed,
            Err(e) => {
                warn!("Rejected {}: {}", mutation.name(), e);
                return Err(e);
            }
        };

        if !changed {
            debug!("{} changed nothing", mutation.name());
            return Ok(());
        }

        if let Err(e) = self.store.apply(&mutation, &next).await {
            warn!(
                "{} store failed to persist {}: {}",
                self.store.name(),
                mutation.name(),
                e
            );
            return Err(e);
        }

        *self.snapshot.write() = Arc::new(next);
        self.invalidate_cache();

        info!("Committed {}", mutation.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::SessionIdentity;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory store that can be told to fail
    #[derive(Default)]
    struct MemoryStore {
        fail: AtomicBool,
    }

    #[async_trait]
    impl GraphStore for MemoryStore {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn load(&self) -> Result<Snapshot> {
            Ok(Snapshot::new())
        }

        async fn apply(&self, _mutation: &Mutation, _after: &Snapshot) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AuthzError::Backend("disk full".to_string()));
            }
            Ok(())
        }
    }

    async fn engine() -> (AuthorizationEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let engine = AuthorizationEngine::new(EngineConfig::default(), store.clone())
            .await
            .unwrap();

        engine.add_item(Item::role("editor")).await.unwrap();
        engine.add_item(Item::permission("create_post")).await.unwrap();
        engine.add_child("editor", "create_post").await.unwrap();
        engine.assign("42", "editor").await.unwrap();

        (engine, store)
    }

    #[tokio::test]
    async fn test_check() {
        let (engine, _) = engine().await;
        let params = Params::new();

        assert!(engine.check("42", "create_post", &params).unwrap());
        assert!(!engine.check("7", "create_post", &params).unwrap());
        assert!(matches!(
            engine.check("42", "ghost", &params),
            Err(AuthzError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mutation_clears_cache() {
        let (engine, _) = engine().await;
        let params = Params::new();

        assert!(engine.check("42", "create_post", &params).unwrap());
        assert!(engine.check("42", "create_post", &params).unwrap());
        assert_eq!(engine.cache_stats().unwrap().hits, 1);

        engine.remove_child("editor", "create_post").await.unwrap();
        assert_eq!(engine.cache_stats().unwrap().entries, 0);
        assert!(!engine.check("42", "create_post", &params).unwrap());
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_snapshot() {
        let (engine, store) = engine().await;
        store.fail.store(true, Ordering::SeqCst);

        let result = engine.revoke("42", "editor").await;
        assert!(matches!(result, Err(AuthzError::Backend(_))));
        assert!(engine.is_assigned("42", "editor"));
        assert!(engine.check("42", "create_post", &Params::new()).unwrap());
    }

    #[tokio::test]
    async fn test_rejected_mutation_leaves_state() {
        let (engine, _) = engine().await;
        let before = engine.snapshot();

        let result = engine.add_child("create_post", "editor").await;
        assert!(matches!(result, Err(AuthzError::Structural(_))));
        assert!(Arc::ptr_eq(&before, &engine.snapshot()));
    }

    #[tokio::test]
    async fn test_identity_feeds_not_guest() {
        let store = Arc::new(MemoryStore::default());
        let identity = Arc::new(SessionIdentity::new());
        let engine = AuthorizationEngine::new(EngineConfig::default(), store)
            .await
            .unwrap()
            .with_identity(identity.clone());

        engine
            .add_item(Item::role("user").with_rule("not_guest"))
            .await
            .unwrap();
        engine.assign("42", "user").await.unwrap();

        let params = Params::new();
        assert!(!engine.check("42", "user", &params).unwrap());

        identity.login("42");
        assert!(engine.check("42", "user", &params).unwrap());
    }

    #[tokio::test]
    async fn test_explain() {
        let (engine, _) = engine().await;

        assert_eq!(
            engine.explain("42", "create_post", &Params::new()).unwrap(),
            Some(vec!["editor".to_string(), "create_post".to_string()])
        );
        assert_eq!(engine.explain("7", "create_post", &Params::new()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_register_rule_clears_cache() {
        let (engine, _) = engine().await;
        engine
            .update_item(
                "editor",
                ItemPatch {
                    rule: Some(Some("custom".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let params = Params::new();
        assert!(!engine.check("42", "create_post", &params).unwrap());

        engine.register_rule("custom", || crate::rules::AlwaysAllow);
        assert!(engine.check("42", "create_post", &params).unwrap());
    }
}
