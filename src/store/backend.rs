use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ShipperError;

/// The two durable namespaces, each stored under a fixed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Auth,
    Orders,
}

impl Namespace {
    pub fn storage_key(self) -> &'static str {
        match self {
            Namespace::Auth => "shipper-auth",
            Namespace::Orders => "shipper-orders",
        }
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    async fn load(&self, namespace: Namespace) -> Result<Option<Vec<u8>>, ShipperError>;
    async fn save(&self, namespace: Namespace, bytes: Vec<u8>) -> Result<(), ShipperError>;
    async fn remove(&self, namespace: Namespace) -> Result<(), ShipperError>;
}

/// One JSON file per namespace inside `dir`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, namespace: Namespace) -> PathBuf {
        self.dir.join(format!("{}.json", namespace.storage_key()))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn load(&self, namespace: Namespace) -> Result<Option<Vec<u8>>, ShipperError> {
        let path = self.path_for(namespace);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ShipperError::Storage(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    async fn save(&self, namespace: Namespace, bytes: Vec<u8>) -> Result<(), ShipperError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            ShipperError::Storage(format!("failed to create {}: {err}", self.dir.display()))
        })?;

        // Write-then-rename keeps the previous snapshot intact if the process dies mid-write.
        let path = self.path_for(namespace);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes).await.map_err(|err| {
            ShipperError::Storage(format!("failed to write {}: {err}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|err| {
            ShipperError::Storage(format!("failed to replace {}: {err}", path.display()))
        })
    }

    async fn remove(&self, namespace: Namespace) -> Result<(), ShipperError> {
        let path = self.path_for(namespace);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ShipperError::Storage(format!(
                "failed to remove {}: {err}",
                path.display()
            ))),
        }
    }
}

/// In-process backend. Clones share the same entries, so a test can drop a
/// store and reopen another one over the same data to simulate a relaunch.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<DashMap<Namespace, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, namespace: Namespace) -> Option<Vec<u8>> {
        self.entries.get(&namespace).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self, namespace: Namespace) -> Result<Option<Vec<u8>>, ShipperError> {
        Ok(self.raw(namespace))
    }

    async fn save(&self, namespace: Namespace, bytes: Vec<u8>) -> Result<(), ShipperError> {
        self.entries.insert(namespace, bytes);
        Ok(())
    }

    async fn remove(&self, namespace: Namespace) -> Result<(), ShipperError> {
        self.entries.remove(&namespace);
        Ok(())
    }
}
