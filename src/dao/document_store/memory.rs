use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use super::{DocumentStore, DocumentWatch, merge_json};
use crate::dao::storage::{StorageError, StorageResult};

const CHANGE_CAPACITY: usize = 64;
const WATCH_CAPACITY: usize = 16;

/// Process-local document store, used by tests and the offline demo.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    documents: DashMap<String, Value>,
    changes: broadcast::Sender<(String, Value)>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                documents: DashMap::new(),
                changes,
            }),
        }
    }

    /// Overwrite a document as another client would, notifying watchers.
    pub fn put_remote(&self, path: &str, document: Value) {
        self.inner.documents.insert(path.to_string(), document.clone());
        let _ = self.inner.changes.send((path.to_string(), document));
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.inner.documents.len()
    }

    /// Whether the store holds no document.
    pub fn is_empty(&self) -> bool {
        self.inner.documents.is_empty()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInner {
    fn merge(&self, path: &str, patch: Value, must_exist: bool) -> StorageResult<()> {
        let merged = match self.documents.get_mut(path) {
            Some(mut existing) => {
                merge_json(existing.value_mut(), patch);
                existing.value().clone()
            }
            None if must_exist => return Err(StorageError::not_found(path)),
            None => {
                self.documents.insert(path.to_string(), patch.clone());
                patch
            }
        };
        let _ = self.changes.send((path.to_string(), merged));
        Ok(())
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn set_merge(&self, path: &str, document: Value) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let path = path.to_string();
        Box::pin(async move { inner.merge(&path, document, false) })
    }

    fn get(&self, path: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let inner = self.inner.clone();
        let path = path.to_string();
        Box::pin(async move { Ok(inner.documents.get(&path).map(|doc| doc.value().clone())) })
    }

    fn update(&self, path: &str, fields: Value) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let path = path.to_string();
        Box::pin(async move { inner.merge(&path, fields, true) })
    }

    fn subscribe(&self, path: &str) -> BoxFuture<'static, StorageResult<DocumentWatch>> {
        // Subscribe before spawning so no change between now and the first
        // poll of the forwarder is lost.
        let mut changes = BroadcastStream::new(self.inner.changes.subscribe());
        let path = path.to_string();
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(WATCH_CAPACITY);
            let task = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tx.closed() => break,
                        next = changes.next() => match next {
                            Some(Ok((changed, document))) if changed == path => {
                                if tx.send(document).await.is_err() {
                                    break;
                                }
                            }
                            // Other documents, or lagged messages: keep going.
                            Some(_) => continue,
                            None => break,
                        }
                    }
                }
            });
            Ok(DocumentWatch::new(rx, task))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn set_merge_upserts_and_preserves_fields() {
        let store = MemoryDocumentStore::new();
        store
            .set_merge("users/u1", json!({"a": 1, "b": 2}))
            .await
            .unwrap();
        store.set_merge("users/u1", json!({"b": 3})).await.unwrap();

        let doc = store.get("users/u1").await.unwrap();
        assert_eq!(doc, Some(json!({"a": 1, "b": 3})));
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = MemoryDocumentStore::new();
        let err = store.update("users/ghost", json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn watchers_only_see_their_document() {
        let store = MemoryDocumentStore::new();
        let mut watch = store.subscribe("users/u1").await.unwrap();

        store.put_remote("users/u2", json!({"x": 0}));
        store.put_remote("users/u1", json!({"x": 1}));

        assert_eq!(watch.next().await, Some(json!({"x": 1})));
    }
}
