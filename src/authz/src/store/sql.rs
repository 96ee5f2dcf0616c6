//! Relational graph store (sqlx, SQLite)
//!
//! Tables `rbac_items`, `rbac_edges` and `rbac_assignments` are created by the
//! embedded migrations. `load` bulk-reads all three tables and materializes
//! them through the same validation as the compiled-file store. Each mutation
//! runs in its own transaction. Cycle prevention is never delegated to the
//! database: the engine validates every edge in memory before it gets here.

use super::{GraphStore, Mutation, Snapshot};
use crate::error::{AuthzError, Result};
use crate::types::{Item, ItemKind};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// SQLite graph store with connection pooling
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Connect to a database
    ///
    /// # Arguments
    /// * `database_url` - SQLite connection string (`sqlite://rbac.db`, `sqlite::memory:`)
    /// * `max_connections` - pool size; in-memory databases always use one
    ///   connection so every query sees the same database
    ///
    /// # Example
    /// ```no_run
    /// use rolegate_authz::store::SqlStore;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = SqlStore::connect("sqlite://rbac.db", 5).await?;
    /// store.run_migrations().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AuthzError::Config(format!("Invalid database url: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(3));
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            pool_options
                .max_connections(max_connections.max(1))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AuthzError::Backend(format!("Failed to connect to database: {}", e)))?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AuthzError::Backend(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    /// Get database pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace the whole content of the tables with `snapshot`
    pub async fn import(&self, snapshot: &Snapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM rbac_assignments").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM rbac_edges").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM rbac_items").execute(&mut *tx).await?;

        for item in snapshot.graph.items(None) {
            insert_item(&mut tx, item).await?;
        }
        for (parent, child) in snapshot.graph.edges() {
            sqlx::query("INSERT INTO rbac_edges (parent, child) VALUES (?, ?)")
                .bind(parent)
                .bind(child)
                .execute(&mut *tx)
                .await?;
        }
        for (principal, item) in snapshot.assignments.iter() {
            sqlx::query("INSERT INTO rbac_assignments (principal, item) VALUES (?, ?)")
                .bind(principal)
                .bind(item)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            "Imported {} items and {} assignments into database",
            snapshot.graph.len(),
            snapshot.assignments.len()
        );
        Ok(())
    }
}

#[async_trait]
impl GraphStore for SqlStore {
    fn name(&self) -> &'static str {
        "sql"
    }

    async fn load(&self) -> Result<Snapshot> {
        let item_rows = sqlx::query(
            "SELECT name, kind, description, sort_order, rule FROM rbac_items ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let items = item_rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<Item>>>()?;

        let edges: Vec<(String, String)> =
            sqlx::query("SELECT parent, child FROM rbac_edges ORDER BY parent, child")
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|row| -> Result<(String, String)> {
                    Ok((row.try_get("parent")?, row.try_get("child")?))
                })
                .collect::<Result<_>>()?;

        let assignments: Vec<(String, String)> =
            sqlx::query("SELECT principal, item FROM rbac_assignments ORDER BY principal, item")
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|row| -> Result<(String, String)> {
                    Ok((row.try_get("principal")?, row.try_get("item")?))
                })
                .collect::<Result<_>>()?;

        let snapshot = Snapshot::from_parts(items, edges, assignments)?;

        info!(
            "Loaded graph from database: {} items, {} assignments",
            snapshot.graph.len(),
            snapshot.assignments.len()
        );
        Ok(snapshot)
    }

    async fn apply(&self, mutation: &Mutation, after: &Snapshot) -> Result<()> {
        debug!("Persisting {} to database", mutation.name());

        let mut tx = self.pool.begin().await?;

        match mutation {
            Mutation::AddItem(item) => {
                insert_item(&mut tx, item).await?;
            }
            Mutation::UpdateItem { name, .. } => {
                let item = after
                    .graph
                    .get(name)
                    .ok_or_else(|| AuthzError::NotFound(name.clone()))?;

                sqlx::query(
                    "UPDATE rbac_items SET description = ?, sort_order = ?, rule = ? WHERE name = ?",
                )
                .bind(&item.description)
                .bind(i64::from(item.order))
                .bind(item.rule.as_deref())
                .bind(&item.name)
                .execute(&mut *tx)
                .await?;
            }
            Mutation::RemoveItem { name } => {
                // Cascade explicitly rather than relying on foreign keys
                sqlx::query("DELETE FROM rbac_assignments WHERE item = ?")
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM rbac_edges WHERE parent = ? OR child = ?")
                    .bind(name)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM rbac_items WHERE name = ?")
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
            }
            Mutation::AddChild { parent, child } => {
                sqlx::query("INSERT INTO rbac_edges (parent, child) VALUES (?, ?)")
                    .bind(parent)
                    .bind(child)
                    .execute(&mut *tx)
                    .await?;
            }
            Mutation::RemoveChild { parent, child } => {
                let result = sqlx::query("DELETE FROM rbac_edges WHERE parent = ? AND child = ?")
                    .bind(parent)
                    .bind(child)
                    .execute(&mut *tx)
                    .await?;

                if result.rows_affected() == 0 {
                    return Err(AuthzError::Backend(format!(
                        "edge {} -> {} missing from database",
                        parent, child
                    )));
                }
            }
            Mutation::Assign { principal, item } => {
                sqlx::query("INSERT OR IGNORE INTO rbac_assignments (principal, item) VALUES (?, ?)")
                    .bind(principal)
                    .bind(item)
                    .execute(&mut *tx)
                    .await?;
            }
            Mutation::Revoke { principal, item } => {
                let result =
                    sqlx::query("DELETE FROM rbac_assignments WHERE principal = ? AND item = ?")
                        .bind(principal)
                        .bind(item)
                        .execute(&mut *tx)
                        .await?;

                if result.rows_affected() == 0 {
                    return Err(AuthzError::NotAssigned {
                        principal: principal.clone(),
                        item: item.clone(),
                    });
                }
            }
            Mutation::RevokeAll { principal } => {
                sqlx::query("DELETE FROM rbac_assignments WHERE principal = ?")
                    .bind(principal)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn insert_item(tx: &mut Transaction<'_, Sqlite>, item: &Item) -> Result<()> {
    sqlx::query(
        "INSERT INTO rbac_items (name, kind, description, sort_order, rule) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&item.name)
    .bind(item.kind.as_str())
    .bind(&item.description)
    .bind(i64::from(item.order))
    .bind(item.rule.as_deref())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    let name: String = row.try_get("name")?;
    let kind: String = row.try_get("kind")?;
    let order: i64 = row.try_get("sort_order")?;

    Ok(Item {
        kind: ItemKind::from_str(&kind)?,
        description: row.try_get("description")?,
        order: i32::try_from(order).map_err(|_| {
            AuthzError::Backend(format!("sort_order {} of item '{}' out of range", order, name))
        })?,
        rule: row.try_get("rule")?,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqlStore {
        let store = SqlStore::connect("sqlite::memory:", 1).await.unwrap();
        store.run_migrations().await.unwrap();
        store
    }

    fn sample() -> Snapshot {
        Snapshot::from_parts(
            vec![
                Item::role("editor").with_order(1),
                Item::role("user").with_rule("not_guest"),
                Item::permission("create_post"),
            ],
            vec![
                ("editor".to_string(), "user".to_string()),
                ("editor".to_string(), "create_post".to_string()),
            ],
            vec![("42".to_string(), "editor".to_string())],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_import_and_load() {
        let store = memory_store().await;
        store.import(&sample()).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.graph.len(), 3);
        assert_eq!(loaded.graph.edges().len(), 2);
        assert_eq!(loaded.graph.get("editor").unwrap().order, 1);
        assert_eq!(
            loaded.graph.get("user").unwrap().rule.as_deref(),
            Some("not_guest")
        );
        assert!(loaded.assignments.is_assigned("42", "editor"));
    }

    #[tokio::test]
    async fn test_remove_item_cascades_in_tables() {
        let store = memory_store().await;
        let mut snapshot = sample();
        store.import(&snapshot).await.unwrap();

        let mutation = Mutation::RemoveItem {
            name: "editor".to_string(),
        };
        snapshot.apply(&mutation).unwrap();
        store.apply(&mutation, &snapshot).await.unwrap();

        let edges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rbac_edges")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let grants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rbac_assignments")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(edges, 0);
        assert_eq!(grants, 0);

        let loaded = store.load().await.unwrap();
        assert!(!loaded.graph.contains("editor"));
    }

    #[tokio::test]
    async fn test_revoke_missing_row() {
        let store = memory_store().await;
        store.import(&sample()).await.unwrap();

        let mutation = Mutation::Revoke {
            principal: "7".to_string(),
            item: "editor".to_string(),
        };
        let result = store.apply(&mutation, &sample()).await;
        assert!(matches!(result, Err(AuthzError::NotAssigned { .. })));
    }

    #[tokio::test]
    async fn test_update_item_persists_rule_change() {
        let store = memory_store().await;
        let mut snapshot = sample();
        store.import(&snapshot).await.unwrap();

        let mutation = Mutation::UpdateItem {
            name: "user".to_string(),
            patch: crate::types::ItemPatch {
                rule: Some(None),
                description: Some("Any user".to_string()),
                ..Default::default()
            },
        };
        snapshot.apply(&mutation).unwrap();
        store.apply(&mutation, &snapshot).await.unwrap();

        let loaded = store.load().await.unwrap();
        let user = loaded.graph.get("user").unwrap();
        assert!(user.rule.is_none());
        assert_eq!(user.description, "Any user");
    }
}
