//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use rolegate_authz::{
    AuthorizationEngine, EngineConfig, GraphStore, IdentityProvider, Item, Mutation,
    ParamEquals, Params, Result, Snapshot,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Store that serves a fixed snapshot and accepts every write
pub struct Preloaded(pub Snapshot);

#[async_trait]
impl GraphStore for Preloaded {
    fn name(&self) -> &'static str {
        "preloaded"
    }

    async fn load(&self) -> Result<Snapshot> {
        Ok(self.0.clone())
    }

    async fn apply(&self, _mutation: &Mutation, _after: &Snapshot) -> Result<()> {
        Ok(())
    }
}

pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        other => panic!("params must be a JSON object, got {}", other),
    }
}

pub fn flagged() -> Params {
    params(json!({ "flag": true }))
}

/// Items of the blog scenario
///
/// ```text
/// godmode -> admin -> editor -> user (not_guest) -> guest -> read_post
/// admin    -> delete_post, reviewer (requires_flag) -> approve_post
/// editor   -> create_post, update_post
/// ```
pub fn blog_items() -> Vec<Item> {
    vec![
        Item::role("godmode").with_order(1),
        Item::role("admin").with_order(2),
        Item::role("editor").with_order(3),
        Item::role("user").with_order(4).with_rule("not_guest"),
        Item::role("guest").with_order(5),
        Item::role("reviewer").with_rule("requires_flag"),
        Item::permission("read_post").with_description("Read a post"),
        Item::permission("create_post").with_description("Create a post"),
        Item::permission("update_post").with_description("Update a post"),
        Item::permission("delete_post").with_description("Delete a post"),
        Item::permission("approve_post"),
    ]
}

pub fn blog_edges() -> Vec<(String, String)> {
    [
        ("godmode", "admin"),
        ("admin", "editor"),
        ("admin", "delete_post"),
        ("admin", "reviewer"),
        ("editor", "user"),
        ("editor", "create_post"),
        ("editor", "update_post"),
        ("user", "guest"),
        ("guest", "read_post"),
        ("reviewer", "approve_post"),
    ]
    .into_iter()
    .map(|(parent, child)| (parent.to_string(), child.to_string()))
    .collect()
}

pub fn blog_assignments() -> Vec<(String, String)> {
    [
        ("1", "godmode"),
        ("2", "admin"),
        ("42", "editor"),
        ("7", "guest"),
        ("9", "reviewer"),
    ]
    .into_iter()
    .map(|(principal, item)| (principal.to_string(), item.to_string()))
    .collect()
}

pub const PRINCIPALS: [&str; 6] = ["1", "2", "42", "7", "9", "nobody"];

/// Populate an engine with the blog scenario through its mutation API
pub async fn populate(engine: &AuthorizationEngine) -> Result<()> {
    for item in blog_items() {
        engine.add_item(item).await?;
    }
    for (parent, child) in blog_edges() {
        engine.add_child(&parent, &child).await?;
    }
    for (principal, item) in blog_assignments() {
        engine.assign(&principal, &item).await?;
    }
    Ok(())
}

/// Engine over `store` with the scenario rules registered
pub async fn engine_over(
    store: Arc<dyn GraphStore>,
    identity: Arc<dyn IdentityProvider>,
) -> AuthorizationEngine {
    let engine = AuthorizationEngine::new(EngineConfig::default(), store)
        .await
        .unwrap()
        .with_identity(identity);
    engine.register_rule("requires_flag", || ParamEquals::new("flag", json!(true)));
    engine
}

/// Every (principal, item, params) decision, in a fixed order
pub fn decision_matrix(engine: &AuthorizationEngine) -> Vec<(String, String, bool, bool)> {
    let mut matrix = Vec::new();
    for principal in PRINCIPALS {
        for item in engine.all_items(None) {
            let plain = engine.check(principal, &item.name, &Params::new()).unwrap();
            let with_flag = engine.check(principal, &item.name, &flagged()).unwrap();
            matrix.push((principal.to_string(), item.name, plain, with_flag));
        }
    }
    matrix
}
