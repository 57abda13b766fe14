use std::{io, path::PathBuf, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::storage::{StorageError, StorageResult};

/// On-device string storage, the fallback used while nobody is signed in.
pub trait LocalStorage: Send + Sync {
    /// Overwrite the value stored under `key`.
    fn set_item(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Read the value stored under `key`.
    fn get_item(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>>;
}

/// Volatile local storage.
#[derive(Clone, Default)]
pub struct MemoryLocalStorage {
    items: Arc<DashMap<String, String>>,
}

impl MemoryLocalStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryLocalStorage {
    fn set_item(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let items = self.items.clone();
        let key = key.to_string();
        Box::pin(async move {
            items.insert(key, value);
            Ok(())
        })
    }

    fn get_item(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let items = self.items.clone();
        let key = key.to_string();
        Box::pin(async move { Ok(items.get(&key).map(|item| item.value().clone())) })
    }
}

/// Local storage keeping one `<key>.json` file per key inside a directory.
#[derive(Clone)]
pub struct DirectoryLocalStorage {
    root: Arc<PathBuf>,
}

impl DirectoryLocalStorage {
    /// Store items below `root`, created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    fn item_path(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::unavailable(
                format!("invalid local storage key `{key}`"),
                io::Error::from(io::ErrorKind::InvalidInput),
            ));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl LocalStorage for DirectoryLocalStorage {
    fn set_item(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let root = self.root.clone();
        let path = self.item_path(key);
        Box::pin(async move {
            let path = path?;
            tokio::fs::create_dir_all(root.as_path())
                .await
                .map_err(|err| {
                    StorageError::unavailable(
                        format!("creating local storage directory {}", root.display()),
                        err,
                    )
                })?;
            tokio::fs::write(&path, value).await.map_err(|err| {
                StorageError::unavailable(format!("writing {}", path.display()), err)
            })
        })
    }

    fn get_item(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let path = self.item_path(key);
        Box::pin(async move {
            let path = path?;
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(Some(contents)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(StorageError::unavailable(
                    format!("reading {}", path.display()),
                    err,
                )),
            }
        })
    }
}
