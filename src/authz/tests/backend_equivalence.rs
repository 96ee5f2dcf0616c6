//! File and SQL stores must yield identical decisions for equivalent data

#![cfg(feature = "sql")]

mod common;

use common::*;
use rolegate_authz::{
    AuthzError, FileStore, GraphStore, IdentityProvider, SessionIdentity, SqlStore,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn sql_store() -> Arc<SqlStore> {
    let store = SqlStore::connect("sqlite::memory:", 1).await.unwrap();
    store.run_migrations().await.unwrap();
    Arc::new(store)
}

fn identity() -> Arc<dyn IdentityProvider> {
    Arc::new(SessionIdentity::logged_in("42"))
}

#[tokio::test]
async fn test_populated_backends_agree() {
    let dir = TempDir::new().unwrap();
    let file_store: Arc<dyn GraphStore> =
        Arc::new(FileStore::new(dir.path().join("rbac.json")).create_if_missing(true));
    let sql: Arc<dyn GraphStore> = sql_store().await;

    let file_engine = engine_over(file_store.clone(), identity()).await;
    let sql_engine = engine_over(sql.clone(), identity()).await;
    populate(&file_engine).await.unwrap();
    populate(&sql_engine).await.unwrap();

    let expected = decision_matrix(&file_engine);
    assert_eq!(expected, decision_matrix(&sql_engine));

    // Fresh engines see the persisted state, not the in-memory one
    let file_reloaded = engine_over(file_store, identity()).await;
    let sql_reloaded = engine_over(sql, identity()).await;
    assert_eq!(expected, decision_matrix(&file_reloaded));
    assert_eq!(expected, decision_matrix(&sql_reloaded));
}

#[tokio::test]
async fn test_backends_agree_after_mutations() {
    let dir = TempDir::new().unwrap();
    let file_store: Arc<dyn GraphStore> =
        Arc::new(FileStore::new(dir.path().join("rbac.json")).create_if_missing(true));
    let sql: Arc<dyn GraphStore> = sql_store().await;

    let mut engines = Vec::new();
    for store in [file_store.clone(), sql.clone()] {
        let engine = engine_over(store, identity()).await;
        populate(&engine).await.unwrap();

        engine.remove_item("editor").await.unwrap();
        engine.remove_child("admin", "reviewer").await.unwrap();
        engine.add_child("admin", "create_post").await.unwrap();
        engine.assign("42", "guest").await.unwrap();
        engine.revoke("7", "guest").await.unwrap();
        engine.revoke_all("9").await.unwrap();
        engines.push(engine);
    }

    assert_eq!(decision_matrix(&engines[0]), decision_matrix(&engines[1]));

    let file_reloaded = engine_over(file_store, identity()).await;
    let sql_reloaded = engine_over(sql, identity()).await;
    assert_eq!(decision_matrix(&file_reloaded), decision_matrix(&sql_reloaded));
    assert_eq!(decision_matrix(&file_reloaded), decision_matrix(&engines[0]));
    assert!(sql_reloaded.items_of("42").contains(&"guest".to_string()));
    assert!(sql_reloaded.items_of("9").is_empty());
}

#[tokio::test]
async fn test_revoke_policy_is_uniform() {
    let dir = TempDir::new().unwrap();
    let stores: [Arc<dyn GraphStore>; 2] = [
        Arc::new(FileStore::new(dir.path().join("rbac.json")).create_if_missing(true)),
        sql_store().await,
    ];

    for store in stores {
        let engine = engine_over(store, identity()).await;
        populate(&engine).await.unwrap();

        engine.assign("42", "editor").await.unwrap();
        assert_eq!(engine.items_of("42").len(), 1);

        assert!(matches!(
            engine.revoke("nobody", "editor").await,
            Err(AuthzError::NotAssigned { .. })
        ));
        engine.revoke_all("nobody").await.unwrap();
    }
}

#[tokio::test]
async fn test_copy_between_backends() {
    let dir = TempDir::new().unwrap();
    let file_store = Arc::new(FileStore::new(dir.path().join("rbac.json")).create_if_missing(true));
    let source = engine_over(file_store.clone(), identity()).await;
    populate(&source).await.unwrap();

    let sql = sql_store().await;
    sql.import(&file_store.load().await.unwrap()).await.unwrap();
    let copied = engine_over(sql.clone(), identity()).await;
    assert_eq!(decision_matrix(&source), decision_matrix(&copied));

    let exported = FileStore::new(dir.path().join("export.json"));
    exported.save(&sql.load().await.unwrap()).await.unwrap();
    let from_export = engine_over(Arc::new(exported), identity()).await;
    assert_eq!(decision_matrix(&source), decision_matrix(&from_export));
}
