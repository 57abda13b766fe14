use std::{io, path::PathBuf, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::storage::{StorageError, StorageResult};

/// Binary object storage addressed by slash-separated paths.
pub trait FileStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any previous object.
    fn upload(&self, path: &str, bytes: Vec<u8>) -> BoxFuture<'static, StorageResult<()>>;
    /// Public address of the object at `path`.
    fn public_url(&self, path: &str) -> BoxFuture<'static, StorageResult<String>>;
}

/// Volatile file store serving objects under a fixed base URL.
#[derive(Clone)]
pub struct MemoryFileStore {
    files: Arc<DashMap<String, Vec<u8>>>,
    base_url: Arc<str>,
}

impl MemoryFileStore {
    /// Create an empty store whose URLs start with `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            files: Arc::new(DashMap::new()),
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    /// Bytes stored at `path`.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).map(|file| file.value().clone())
    }
}

impl FileStore for MemoryFileStore {
    fn upload(&self, path: &str, bytes: Vec<u8>) -> BoxFuture<'static, StorageResult<()>> {
        let files = self.files.clone();
        let path = path.to_string();
        Box::pin(async move {
            files.insert(path, bytes);
            Ok(())
        })
    }

    fn public_url(&self, path: &str) -> BoxFuture<'static, StorageResult<String>> {
        let files = self.files.clone();
        let base_url = self.base_url.clone();
        let path = path.to_string();
        Box::pin(async move {
            if !files.contains_key(&path) {
                return Err(StorageError::not_found(path));
            }
            Ok(format!("{base_url}/{path}"))
        })
    }
}

/// File store writing objects below a local directory, served as `file://` URLs.
#[derive(Clone)]
pub struct DirectoryFileStore {
    root: Arc<PathBuf>,
}

impl DirectoryFileStore {
    /// Store objects below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    fn object_path(&self, path: &str) -> StorageResult<PathBuf> {
        let segments = path.split('/').collect::<Vec<_>>();
        if segments
            .iter()
            .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            return Err(StorageError::unavailable(
                format!("invalid object path `{path}`"),
                io::Error::from(io::ErrorKind::InvalidInput),
            ));
        }
        Ok(segments
            .into_iter()
            .fold((*self.root).clone(), |acc, segment| acc.join(segment)))
    }
}

impl FileStore for DirectoryFileStore {
    fn upload(&self, path: &str, bytes: Vec<u8>) -> BoxFuture<'static, StorageResult<()>> {
        let target = self.object_path(path);
        Box::pin(async move {
            let target = target?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    StorageError::unavailable(format!("creating {}", parent.display()), err)
                })?;
            }
            tokio::fs::write(&target, bytes).await.map_err(|err| {
                StorageError::unavailable(format!("writing {}", target.display()), err)
            })
        })
    }

    fn public_url(&self, path: &str) -> BoxFuture<'static, StorageResult<String>> {
        let target = self.object_path(path);
        let path = path.to_string();
        Box::pin(async move {
            let target = target?;
            match tokio::fs::canonicalize(&target).await {
                Ok(absolute) => Ok(format!("file://{}", absolute.display())),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    Err(StorageError::not_found(path))
                }
                Err(err) => Err(StorageError::unavailable(
                    format!("resolving {}", target.display()),
                    err,
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_serves_uploaded_objects() {
        let store = MemoryFileStore::new("https://files.example.com/");
        assert!(store.public_url("avatars/u1/me.png").await.is_err());

        store
            .upload("avatars/u1/me.png", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(
            store.public_url("avatars/u1/me.png").await.unwrap(),
            "https://files.example.com/avatars/u1/me.png"
        );
        assert_eq!(store.contents("avatars/u1/me.png"), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn directory_store_rejects_traversal() {
        let store = DirectoryFileStore::new(std::env::temp_dir());
        assert!(store.upload("../etc/passwd", vec![]).await.is_err());
    }
}
