pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::Sqlite;

use std::sync::Arc;

use crate::config::{StorageConfig, init_parent_dir, resolve_path};
use async_trait::async_trait;
use eyre::{Context, Result};

#[cfg(test)]
use mockall::automock;

/// String-keyed durable storage. Every call is last-write-wins on a single
/// key; there are no multi-key transactions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
    /// All keys starting with the literal `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

pub type ArcStore = Arc<dyn KeyValueStore + Send + Sync>;

pub async fn new_store(config: &StorageConfig) -> Result<ArcStore> {
    let store: ArcStore = match config {
        StorageConfig::Memory => Arc::new(MemoryStore::default()),
        StorageConfig::Sqlite(sqlite_config) => {
            let path = match sqlite_config.path.as_deref() {
                Some(path) => {
                    let path = resolve_path(path)
                        .wrap_err(format!("resolving store path {}", path))?;
                    init_parent_dir(&path)?;
                    Some(path)
                }
                None => None,
            };
            Arc::new(Sqlite::new(path.as_deref()).await?)
        }
    };
    Ok(store)
}
