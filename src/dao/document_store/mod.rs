#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::dao::storage::StorageResult;

pub use memory::MemoryDocumentStore;

/// Abstraction over the remote document database keyed by slash-separated paths
/// such as `users/{uid}`.
pub trait DocumentStore: Send + Sync {
    /// Upsert `document`, deep-merging objects into any stored document so
    /// fields absent from the payload are preserved.
    fn set_merge(&self, path: &str, document: Value) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch the document at `path`.
    fn get(&self, path: &str) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    /// Merge `fields` into an existing document; fails when it does not exist.
    fn update(&self, path: &str, fields: Value) -> BoxFuture<'static, StorageResult<()>>;
    /// Watch remote changes of the document at `path`.
    fn subscribe(&self, path: &str) -> BoxFuture<'static, StorageResult<DocumentWatch>>;
}

/// Live feed of document snapshots. Dropping the watch unsubscribes.
pub struct DocumentWatch {
    receiver: mpsc::Receiver<Value>,
    task: JoinHandle<()>,
}

impl DocumentWatch {
    /// Wrap the receiving end of a forwarder task.
    pub fn new(receiver: mpsc::Receiver<Value>, task: JoinHandle<()>) -> Self {
        Self { receiver, task }
    }

    /// Wait for the next snapshot; `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }
}

impl Drop for DocumentWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Deep-merge `patch` into `target`: objects merge key by key, every other
/// value (arrays included) replaces what was there.
pub fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value)
                    }
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
