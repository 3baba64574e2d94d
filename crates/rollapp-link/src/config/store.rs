// LinkStateStore: persisted LinkPath records keyed by path name

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::{ConfigError, PathConfig};
use crate::relay::path::LinkPath;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Narrow get/put contract over persisted link state.
///
/// Entries are keyed by path name. Callers serialise operations per name; see
/// [`crate::orchestrator::Orchestrator`].
#[async_trait]
pub trait LinkStateStore: Send + Sync {
    async fn get_link_path(&self, name: &str) -> Result<Option<LinkPath>, StoreError>;
    async fn put_link_path(&self, name: &str, path: &LinkPath) -> Result<(), StoreError>;
}

/// In-process store for tests and embedding.
#[derive(Default)]
pub struct MemoryLinkStore {
    paths: RwLock<HashMap<String, LinkPath>>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, name: &str, path: LinkPath) -> Self {
        self.paths.get_mut().insert(name.to_string(), path);
        self
    }
}

#[async_trait]
impl LinkStateStore for MemoryLinkStore {
    async fn get_link_path(&self, name: &str) -> Result<Option<LinkPath>, StoreError> {
        Ok(self.paths.read().await.get(name).cloned())
    }

    async fn put_link_path(&self, name: &str, path: &LinkPath) -> Result<(), StoreError> {
        self.paths.write().await.insert(name.to_string(), path.clone());
        Ok(())
    }
}

/// Store backed by the `[paths]` table of the configuration file.
///
/// Rewrites only `[paths.<name>]`; every other section of the document is kept.
pub struct TomlLinkStore {
    file: PathBuf,
    write_lock: Mutex<()>,
}

impl TomlLinkStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    async fn read_document(&self) -> Result<toml::Table, StoreError> {
        match tokio::fs::read_to_string(&self.file).await {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| StoreError::Config(ConfigError::Parse(e.to_string()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(toml::Table::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &toml::Table) -> Result<(), StoreError> {
        let content = toml::to_string_pretty(document).map_err(|e| StoreError::Serialize(e.to_string()))?;
        if let Some(parent) = self.file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so a reader never sees a half-written file
        let staging = self.file.with_extension("toml.tmp");
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, &self.file).await?;
        Ok(())
    }

    fn decode_entry(name: &str, value: toml::Value) -> Result<PathConfig, StoreError> {
        value
            .try_into::<PathConfig>()
            .map_err(|e| StoreError::Serialize(format!("paths.{}: {}", name, e)))
    }
}

#[async_trait]
impl LinkStateStore for TomlLinkStore {
    async fn get_link_path(&self, name: &str) -> Result<Option<LinkPath>, StoreError> {
        let document = self.read_document().await?;
        let entry = document
            .get("paths")
            .and_then(|paths| paths.get(name))
            .cloned();

        match entry {
            Some(value) => Ok(Some(Self::decode_entry(name, value)?.link_path())),
            None => Ok(None),
        }
    }

    async fn put_link_path(&self, name: &str, path: &LinkPath) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;

        let paths = document
            .entry("paths".to_string())
            .or_insert(toml::Value::Table(toml::Table::new()));
        let paths = paths
            .as_table_mut()
            .ok_or_else(|| StoreError::Serialize("'paths' is not a table".to_string()))?;

        let mut entry = match paths.remove(name) {
            Some(existing) => Self::decode_entry(name, existing)?,
            None => PathConfig {
                src_chain: path.side_a.chain_id.clone(),
                dst_chain: path.side_b.chain_id.clone(),
                ..Default::default()
            },
        };
        entry.apply(path);

        let value = toml::Value::try_from(&entry).map_err(|e| StoreError::Serialize(e.to_string()))?;
        paths.insert(name.to_string(), value);

        self.write_document(&document).await?;
        debug!("Stored link path {} in {}", name, self.file.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::path::ChannelState;

    fn open_path() -> LinkPath {
        let mut path = LinkPath::new("rollapp_1234-1", "dymension_1100-1");
        path.side_a.connection_id = "connection-0".to_string();
        path.side_a.channel_id = "channel-0".to_string();
        path.side_b.connection_id = "connection-7".to_string();
        path.side_b.channel_id = "channel-12".to_string();
        path.state = ChannelState::Open;
        path
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryLinkStore::new();
        assert_eq!(store.get_link_path("hub-rollapp").await.unwrap(), None);

        store.put_link_path("hub-rollapp", &open_path()).await.unwrap();
        assert_eq!(store.get_link_path("hub-rollapp").await.unwrap(), Some(open_path()));
    }

    #[tokio::test]
    async fn test_toml_store_preserves_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rollapp-link.toml");
        std::fs::write(
            &file,
            "[global]\nlog_level = \"warn\"\n\n[paths.hub-rollapp]\nsrc_chain = \"rollapp\"\ndst_chain = \"hub\"\n",
        )
        .unwrap();

        let store = TomlLinkStore::new(&file);
        let initial = store.get_link_path("hub-rollapp").await.unwrap().unwrap();
        assert_eq!(initial.state, ChannelState::Unknown);

        store.put_link_path("hub-rollapp", &open_path()).await.unwrap();

        let reloaded = store.get_link_path("hub-rollapp").await.unwrap().unwrap();
        assert_eq!(reloaded, open_path());

        let config = crate::config::OrchestratorConfig::from_toml_str(&std::fs::read_to_string(&file).unwrap())
            .unwrap();
        assert_eq!(config.global.log_level, "warn");
        let entry = config.path("hub-rollapp").unwrap();
        assert_eq!(entry.src_chain, "rollapp");
        assert_eq!(entry.dst_chain, "hub");
        assert_eq!(entry.dst.channel_id, "channel-12");
    }

    #[tokio::test]
    async fn test_toml_store_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlLinkStore::new(dir.path().join("fresh").join("links.toml"));

        assert_eq!(store.get_link_path("p").await.unwrap(), None);
        store.put_link_path("p", &open_path()).await.unwrap();
        assert_eq!(store.get_link_path("p").await.unwrap(), Some(open_path()));
    }
}
