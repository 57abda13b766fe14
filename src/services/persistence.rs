use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    dao::{
        document_store::DocumentStore,
        local_storage::LocalStorage,
        models::{decode_game_state, decode_game_state_str, decode_results, game_state_doc_path},
    },
    error::PersistenceError,
    services::notifications::NotificationHub,
    state::{
        game::{GameResult, GameState},
        session::Identity,
    },
};

/// Picks the storage location from the owner identity: the per-user remote
/// document when signed in, the local storage item otherwise.
pub struct PersistenceAdapter {
    documents: Arc<dyn DocumentStore>,
    local: Arc<dyn LocalStorage>,
    local_key: String,
}

impl PersistenceAdapter {
    /// Adapter writing anonymous state under `local_key`.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        local: Arc<dyn LocalStorage>,
        local_key: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            local,
            local_key: local_key.into(),
        }
    }

    /// Persist `state`. Remote writes merge into the stored document; local
    /// writes overwrite the whole item.
    pub async fn save(
        &self,
        owner: Option<&Identity>,
        state: &GameState,
    ) -> Result<(), PersistenceError> {
        match owner {
            Some(identity) => {
                let document = serde_json::to_value(state).map_err(PersistenceError::Encode)?;
                let path = game_state_doc_path(&identity.uid);
                self.documents.set_merge(&path, document).await?;
                debug!(path = %path, attempts = state.attempts, "saved game state remotely");
            }
            None => {
                let json = serde_json::to_string(state).map_err(PersistenceError::Encode)?;
                self.local.set_item(&self.local_key, json).await?;
                debug!(key = %self.local_key, attempts = state.attempts, "saved game state locally");
            }
        }
        Ok(())
    }

    /// Read and validate the stored state; `None` when nothing was saved yet.
    pub async fn load(&self, owner: Option<&Identity>) -> Result<Option<GameState>, PersistenceError> {
        match owner {
            Some(identity) => {
                let path = game_state_doc_path(&identity.uid);
                match self.documents.get(&path).await? {
                    Some(document) => Ok(Some(decode_game_state(&path, document)?)),
                    None => Ok(None),
                }
            }
            None => match self.local.get_item(&self.local_key).await? {
                Some(json) => Ok(Some(decode_game_state_str(&self.local_key, &json)?)),
                None => Ok(None),
            },
        }
    }

    /// Read only the result history of the remote document of `owner`.
    pub async fn load_results(
        &self,
        owner: &Identity,
    ) -> Result<Option<Vec<GameResult>>, PersistenceError> {
        let path = game_state_doc_path(&owner.uid);
        match self.documents.get(&path).await? {
            Some(document) => Ok(Some(decode_results(&path, document)?)),
            None => Ok(None),
        }
    }
}

enum SaveCommand {
    Save {
        owner: Option<Identity>,
        state: Box<GameState>,
    },
    Flush(oneshot::Sender<()>),
}

/// Ordered, fire-and-forget save pipeline.
///
/// A single writer task drains the queue, so saves reach storage in the order
/// they were enqueued. Each command carries the owner captured at enqueue time.
#[derive(Clone)]
pub struct SaveQueue {
    sender: mpsc::UnboundedSender<SaveCommand>,
}

impl SaveQueue {
    /// Spawn the writer task. It stops once every queue handle is dropped.
    pub fn spawn(adapter: Arc<PersistenceAdapter>, notifications: NotificationHub) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(adapter, notifications, receiver));
        Self { sender }
    }

    /// Queue a snapshot for saving.
    pub fn enqueue(&self, owner: Option<Identity>, state: GameState) {
        let command = SaveCommand::Save {
            owner,
            state: Box::new(state),
        };
        if self.sender.send(command).is_err() {
            warn!("save queue writer stopped; dropping game state save");
        }
    }

    /// Wait until every save enqueued before this call has completed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(SaveCommand::Flush(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }
}

async fn run_writer(
    adapter: Arc<PersistenceAdapter>,
    notifications: NotificationHub,
    mut receiver: mpsc::UnboundedReceiver<SaveCommand>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            SaveCommand::Save { owner, state } => {
                if let Err(err) = adapter.save(owner.as_ref(), &state).await {
                    warn!(
                        uid = owner.as_ref().map(|identity| identity.uid.as_str()),
                        error = %err,
                        "failed to save game state"
                    );
                    notifications.warning("Your progress could not be saved.");
                }
            }
            SaveCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("save queue writer finished");
}
