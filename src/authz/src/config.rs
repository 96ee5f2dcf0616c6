//! Engine settings loading and validation
//!
//! ```toml
//! [backend]
//! type = "sql"
//! url = "sqlite://rbac.db"
//! max_connections = 5
//!
//! [cache]
//! enabled = true
//! capacity = 10000
//! ttl_secs = 0
//! ```

use crate::engine::{CacheConfig, EngineConfig};
use crate::error::{AuthzError, Result};
use crate::store::{FileStore, GraphStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Complete engine settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

/// Where the graph and assignments are persisted
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSettings {
    /// Compiled JSON document
    File {
        path: PathBuf,
        #[serde(default)]
        create_if_missing: bool,
    },

    /// Relational database (SQLite)
    Sql {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings::File {
            path: PathBuf::from("rbac.json"),
            create_if_missing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// 0 keeps decisions until the next mutation
    #[serde(default)]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            ttl_secs: 0,
        }
    }
}

fn default_true() -> bool { true }
fn default_cache_capacity() -> usize { 10_000 }
fn default_max_connections() -> u32 { 5 }

impl EngineSettings {
    /// Load settings from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuthzError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let settings = Self::from_toml(&contents)?;
        info!("Loaded engine settings from {:?}", path);
        Ok(settings)
    }

    /// Parse and validate TOML settings
    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        match &self.backend {
            BackendSettings::File { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(AuthzError::Config(
                        "File backend path cannot be empty".to_string(),
                    ));
                }
            }
            BackendSettings::Sql {
                url,
                max_connections,
            } => {
                if url.trim().is_empty() {
                    return Err(AuthzError::Config(
                        "Database url cannot be empty".to_string(),
                    ));
                }
                if *max_connections == 0 {
                    return Err(AuthzError::Config(
                        "max_connections must be at least 1".to_string(),
                    ));
                }
            }
        }

        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(AuthzError::Config(
                "Cache capacity must be at least 1 when the cache is enabled".to_string(),
            ));
        }

        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            enable_cache: self.cache.enabled,
            cache_config: CacheConfig {
                capacity: self.cache.capacity,
                ttl: (self.cache.ttl_secs > 0).then(|| Duration::from_secs(self.cache.ttl_secs)),
            },
        }
    }

    /// Open the configured store; the relational schema is migrated first
    pub async fn open_store(&self) -> Result<Arc<dyn GraphStore>> {
        match &self.backend {
            BackendSettings::File {
                path,
                create_if_missing,
            } => Ok(Arc::new(
                FileStore::new(path).create_if_missing(*create_if_missing),
            )),
            #[cfg(feature = "sql")]
            BackendSettings::Sql {
                url,
                max_connections,
            } => {
                let store = crate::store::SqlStore::connect(url, *max_connections).await?;
                store.run_migrations().await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "sql"))]
            BackendSettings::Sql { .. } => Err(AuthzError::Config(
                "Relational backend requires the 'sql' feature".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::from_toml("").unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert!(settings.engine_config().enable_cache);
        assert!(settings.engine_config().cache_config.ttl.is_none());
    }

    #[test]
    fn test_parse_sql_backend() {
        let settings = EngineSettings::from_toml(
            r#"
            [backend]
            type = "sql"
            url = "sqlite::memory:"

            [cache]
            capacity = 50
            ttl_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(
            settings.backend,
            BackendSettings::Sql {
                url: "sqlite::memory:".to_string(),
                max_connections: 5,
            }
        );
        let config = settings.engine_config();
        assert_eq!(config.cache_config.capacity, 50);
        assert_eq!(config.cache_config.ttl, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_validation() {
        let empty_path = r#"
            [backend]
            type = "file"
            path = ""
        "#;
        assert!(matches!(
            EngineSettings::from_toml(empty_path),
            Err(AuthzError::Config(_))
        ));

        let zero_capacity = r#"
            [cache]
            capacity = 0
        "#;
        assert!(matches!(
            EngineSettings::from_toml(zero_capacity),
            Err(AuthzError::Config(_))
        ));

        let unknown_backend = r#"
            [backend]
            type = "redis"
        "#;
        assert!(matches!(
            EngineSettings::from_toml(unknown_backend),
            Err(AuthzError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rolegate.toml");
        std::fs::write(
            &path,
            "[backend]\ntype = \"file\"\npath = \"graph.json\"\n",
        )
        .unwrap();

        let settings = EngineSettings::load(&path).unwrap();
        assert_eq!(
            settings.backend,
            BackendSettings::File {
                path: PathBuf::from("graph.json"),
                create_if_missing: false,
            }
        );
        assert!(EngineSettings::load(dir.path().join("missing.toml")).is_err());
    }

    #[tokio::test]
    async fn test_open_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = EngineSettings {
            backend: BackendSettings::File {
                path: dir.path().join("rbac.json"),
                create_if_missing: true,
            },
            cache: CacheSettings::default(),
        };

        let store = settings.open_store().await.unwrap();
        assert_eq!(store.name(), "file");
        assert!(store.load().await.unwrap().graph.is_empty());
    }
}
