//! Artifact storage for strips and the rendered feed.

use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Object metadata (string pairs, like HTTP object headers).
pub type Metadata = HashMap<String, String>;

/// An object store addressed by slash-separated keys.
///
/// Writes to an existing key overwrite it, so date-addressed keys make
/// repeated uploads idempotent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores an object and returns its public URL.
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<String, StoreError>;

    /// Returns an object's metadata, or `None` if the key does not exist.
    async fn metadata(&self, key: &str) -> Result<Option<Metadata>, StoreError>;

    /// Returns the public URL for a key.
    fn url(&self, key: &str) -> String;
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

fn check_key(key: &str) -> Result<(), StoreError> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Returns the store key for a date's strip.
#[must_use]
pub fn strip_key(strips_dir: &str, date: NaiveDate) -> String {
    format!("{}/{date}.gif", strips_dir.trim_end_matches('/'))
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object bytes.
    pub body: Vec<u8>,
    /// MIME type.
    pub content_type: String,
    /// Object metadata.
    pub metadata: Metadata,
}

/// An in-process store for tests and dry runs.
#[derive(Debug)]
pub struct InMemoryArtifactStore {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new("memory://artifacts")
    }
}

impl InMemoryArtifactStore {
    /// Creates an empty store whose URLs start with `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a copy of a stored object.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().get(key).cloned()
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<String, StoreError> {
        check_key(key)?;
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                metadata,
            },
        );
        Ok(self.url(key))
    }

    async fn metadata(&self, key: &str) -> Result<Option<Metadata>, StoreError> {
        Ok(self.objects.read().get(key).map(|o| o.metadata.clone()))
    }

    fn url(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    #[serde(default)]
    metadata: Metadata,
}

/// A directory-backed store.
///
/// Each object is a plain file under `root`; its content type and metadata
/// live next to it in `<file>.meta.json`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalArtifactStore {
    /// Creates a store rooted at `root`, serving URLs under `public_base_url`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Returns the store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the filesystem path for a key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidKey` for empty, absolute or `..` keys.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".meta.json");
        PathBuf::from(name)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<String, StoreError> {
        let path = self.path_for(key)?;
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, body).await.map_err(io_err)?;

        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            metadata,
        };
        let encoded = serde_json::to_vec_pretty(&sidecar).map_err(|source| StoreError::Metadata {
            key: key.to_string(),
            source,
        })?;
        tokio::fs::write(Self::sidecar_path(&path), encoded)
            .await
            .map_err(io_err)?;

        Ok(self.url(key))
    }

    async fn metadata(&self, key: &str) -> Result<Option<Metadata>, StoreError> {
        let path = Self::sidecar_path(&self.path_for(key)?);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        let sidecar: Sidecar = serde_json::from_slice(&raw).map_err(|source| StoreError::Metadata {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(sidecar.metadata))
    }

    fn url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(title: &str) -> Metadata {
        HashMap::from([("title".to_string(), title.to_string())])
    }

    #[tokio::test]
    async fn test_in_memory_put_and_metadata() {
        let store = InMemoryArtifactStore::new("https://cdn.example.com/");
        let url = store
            .put("strips/2024-01-02.gif", vec![1, 2, 3], "image/gif", meta("Tuesday"))
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.example.com/strips/2024-01-02.gif");
        assert_eq!(
            store.metadata("strips/2024-01-02.gif").await.unwrap(),
            Some(meta("Tuesday"))
        );
        assert_eq!(store.get("strips/2024-01-02.gif").unwrap().content_type, "image/gif");
        assert!(store.metadata("strips/missing.gif").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_put_overwrites() {
        let store = InMemoryArtifactStore::default();
        store.put("k", vec![1], "a/b", meta("one")).await.unwrap();
        store.put("k", vec![2], "a/b", meta("two")).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k").unwrap().body, vec![2]);
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let store = InMemoryArtifactStore::default();
        for key in ["", "../secret", "/etc/passwd", "strips/../../x"] {
            let err = store.put(key, vec![], "x/y", Metadata::new()).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "key {key:?}");
        }
    }

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path(), "https://feed.example.com");

        let url = store
            .put("v2/rss.xml", b"<rss/>".to_vec(), "text/xml; charset=utf-8", meta("feed"))
            .await
            .unwrap();

        assert_eq!(url, "https://feed.example.com/v2/rss.xml");
        let on_disk = tokio::fs::read(dir.path().join("v2/rss.xml")).await.unwrap();
        assert_eq!(on_disk, b"<rss/>");
        assert_eq!(store.metadata("v2/rss.xml").await.unwrap(), Some(meta("feed")));
    }

    #[tokio::test]
    async fn test_local_store_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path(), "https://feed.example.com");

        assert!(store.metadata("strips/2020-01-01.gif").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_store_corrupt_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path(), "https://feed.example.com");
        tokio::fs::write(dir.path().join("bad.meta.json"), b"not json")
            .await
            .unwrap();

        let err = store.metadata("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Metadata { .. }));
    }
}
