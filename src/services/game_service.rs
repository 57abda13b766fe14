use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    error::GameError,
    providers::deck::DeckProvider,
    services::{
        notifications::NotificationHub,
        persistence::{PersistenceAdapter, SaveQueue},
    },
    state::{
        engine::{ClickOutcome, GameEngine, ResolutionToken, TurnPhase},
        game::{GameResult, GameState, is_valid_grid_size},
        session::SessionHandle,
    },
};

/// Message broadcast when the last pair of a board is found.
pub const COMPLETION_MESSAGE: &str = "Congratulations! You found all the cards.";

/// Timing and sizing knobs of the game service.
#[derive(Debug, Clone, Copy)]
pub struct GameSettings {
    /// Delay before a mismatch flips back or a finished board is recorded.
    pub resolve_delay: Duration,
    /// Board size dealt when nothing was loaded yet.
    pub default_grid_size: usize,
}

impl From<&AppConfig> for GameSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            resolve_delay: config.resolve_delay,
            default_grid_size: config.default_grid_size,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Scheduled {
    Revert,
    Complete,
}

/// Owner of the game state. Every transition happens under one lock and
/// queues its snapshot for saving before the lock is released.
#[derive(Clone)]
pub struct GameService {
    inner: Arc<GameInner>,
}

struct GameInner {
    engine: Mutex<GameEngine>,
    deck: Arc<dyn DeckProvider>,
    persistence: Arc<PersistenceAdapter>,
    saves: SaveQueue,
    session: SessionHandle,
    notifications: NotificationHub,
    settings: GameSettings,
    scheduled: DashMap<u64, JoinHandle<()>>,
    next_task: AtomicU64,
}

impl GameService {
    /// Wire the service to its collaborators.
    pub fn new(
        deck: Arc<dyn DeckProvider>,
        persistence: Arc<PersistenceAdapter>,
        saves: SaveQueue,
        session: SessionHandle,
        notifications: NotificationHub,
        settings: GameSettings,
    ) -> Self {
        Self {
            inner: Arc::new(GameInner {
                engine: Mutex::new(GameEngine::new()),
                deck,
                persistence,
                saves,
                session,
                notifications,
                settings,
                scheduled: DashMap::new(),
                next_task: AtomicU64::new(0),
            }),
        }
    }

    /// Deal a fresh board of `grid_size` cards unless the loaded board already
    /// has that size.
    pub async fn initialize_cards(&self, grid_size: usize) -> Result<(), GameError> {
        if !is_valid_grid_size(grid_size) {
            return Err(GameError::InvalidGridSize(grid_size));
        }
        if !self.inner.engine.lock().await.needs_deal(grid_size) {
            debug!(grid_size, "board already dealt; keeping it");
            return Ok(());
        }

        let cards = self.inner.deck.initialize_cards(grid_size).await?;

        let mut engine = self.inner.engine.lock().await;
        if !engine.needs_deal(grid_size) {
            debug!(grid_size, "board dealt concurrently; discarding fetched deck");
            return Ok(());
        }
        self.inner.abort_scheduled();
        engine.deal(grid_size, cards);
        self.inner.persist(&engine);
        info!(grid_size, generation = engine.generation(), "dealt new board");
        Ok(())
    }

    /// Apply a click on the card at `index`.
    pub async fn handle_card_click(&self, index: usize) -> ClickOutcome {
        let mut engine = self.inner.engine.lock().await;
        let outcome = engine.handle_card_click(index);
        match outcome {
            ClickOutcome::Ignored(reason) => {
                debug!(index, ?reason, "card click ignored");
            }
            ClickOutcome::FirstSelected => {
                self.inner.persist(&engine);
            }
            ClickOutcome::Matched {
                completes_board,
                token,
            } => {
                self.inner.persist(&engine);
                engine.resolve_match();
                self.inner.persist(&engine);
                debug!(index, attempts = engine.state().attempts, "pair found");
                if completes_board {
                    self.inner.schedule(Scheduled::Complete, token);
                }
            }
            ClickOutcome::Mismatched { token } => {
                self.inner.persist(&engine);
                self.inner.schedule(Scheduled::Revert, token);
            }
        }
        outcome
    }

    /// Clear both selection slots and unlock the board.
    pub async fn reset_state(&self) {
        let mut engine = self.inner.engine.lock().await;
        engine.reset_selection();
        self.inner.persist(&engine);
    }

    /// Append the result of the current board to the history.
    pub async fn add_result(&self) -> GameResult {
        let mut engine = self.inner.engine.lock().await;
        let result = engine.add_result(OffsetDateTime::now_utc());
        self.inner.persist(&engine);
        result
    }

    /// Load the state of the current owner, dealing and saving a fresh board
    /// when nothing is stored. A malformed document leaves the state untouched.
    pub async fn load_state(&self) -> Result<(), GameError> {
        let owner = self.inner.session.current();
        let uid = owner.as_ref().map(|identity| identity.uid.clone());

        match self.inner.persistence.load(owner.as_ref()).await? {
            Some(stored) => {
                let mut engine = self.inner.engine.lock().await;
                self.inner.abort_scheduled();
                if engine.restore(stored) {
                    debug!("resolved a comparison left pending in storage");
                    self.inner.persist(&engine);
                }
                info!(
                    uid = uid.as_deref(),
                    grid_size = engine.state().grid_size,
                    results = engine.state().results.len(),
                    "restored game state"
                );
            }
            None => {
                let grid_size = {
                    let engine = self.inner.engine.lock().await;
                    if engine.state().state_loaded {
                        engine.state().grid_size
                    } else {
                        self.inner.settings.default_grid_size
                    }
                };
                let cards = self.inner.deck.initialize_cards(grid_size).await?;

                let mut engine = self.inner.engine.lock().await;
                self.inner.abort_scheduled();
                engine.deal(grid_size, cards);
                self.inner.persist(&engine);
                info!(uid = uid.as_deref(), grid_size, "no stored game state; dealt new board");
            }
        }
        Ok(())
    }

    /// Run [`GameService::load_state`] unless a state is already loaded.
    pub async fn ensure_loaded(&self) -> Result<(), GameError> {
        if self.inner.engine.lock().await.state().state_loaded {
            return Ok(());
        }
        self.load_state().await
    }

    /// Refresh the result history from the remote document of the signed-in
    /// user and return it.
    pub async fn fetch_results(&self) -> Result<Vec<GameResult>, GameError> {
        if let Some(owner) = self.inner.session.current() {
            if let Some(results) = self.inner.persistence.load_results(&owner).await? {
                debug!(uid = %owner.uid, count = results.len(), "fetched results");
                let mut engine = self.inner.engine.lock().await;
                engine.set_results(results);
            }
        }
        Ok(self.inner.engine.lock().await.state().results.clone())
    }

    /// Drop pending resolutions and reset to the default, unloaded state.
    pub async fn clear(&self) {
        let mut engine = self.inner.engine.lock().await;
        self.inner.abort_scheduled();
        engine.clear();
        debug!("game state cleared");
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> GameState {
        self.inner.engine.lock().await.state().clone()
    }

    /// Turn phase of the current board.
    pub async fn phase(&self) -> TurnPhase {
        self.inner.engine.lock().await.phase()
    }

    /// Wait for every scheduled resolution, then for every queued save.
    pub async fn settle(&self) {
        loop {
            let ids = self
                .inner
                .scheduled
                .iter()
                .map(|entry| *entry.key())
                .collect::<Vec<_>>();
            if ids.is_empty() {
                break;
            }
            for id in ids {
                if let Some((_, handle)) = self.inner.scheduled.remove(&id) {
                    let _ = handle.await;
                }
            }
        }
        self.inner.saves.flush().await;
    }
}

impl GameInner {
    fn persist(&self, engine: &GameEngine) {
        self.saves
            .enqueue(self.session.current(), engine.state().clone());
    }

    fn schedule(self: &Arc<Self>, kind: Scheduled, token: ResolutionToken) {
        let inner = Arc::clone(self);
        let delay = self.settings.resolve_delay;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let mut engine = inner.engine.lock().await;
            match kind {
                Scheduled::Revert => {
                    if engine.resolve_mismatch(token) {
                        inner.persist(&engine);
                    } else {
                        debug!(generation = token.generation, "stale mismatch revert dropped");
                    }
                }
                Scheduled::Complete => {
                    match engine.complete(token, OffsetDateTime::now_utc()) {
                        Some(result) => {
                            inner.notifications.success(COMPLETION_MESSAGE);
                            inner.persist(&engine);
                            info!(
                                attempts = result.attempts,
                                grid_size = result.grid_size,
                                score = result.score,
                                "board completed"
                            );
                        }
                        None => {
                            debug!(generation = token.generation, "stale completion dropped");
                        }
                    }
                }
            }
        });

        self.scheduled.retain(|_, handle| !handle.is_finished());
        let id = self.next_task.fetch_add(1, Ordering::Relaxed);
        self.scheduled.insert(id, handle);
    }

    fn abort_scheduled(&self) {
        self.scheduled.retain(|_, handle| {
            handle.abort();
            false
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{document_store::MemoryDocumentStore, local_storage::MemoryLocalStorage},
        providers::deck::{CatalogDeckProvider, StaticCardCatalog},
        state::session::Session,
    };

    fn service() -> (GameService, Session) {
        let persistence = Arc::new(PersistenceAdapter::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryLocalStorage::new()),
            "gameState",
        ));
        let notifications = NotificationHub::new();
        let saves = SaveQueue::spawn(persistence.clone(), notifications.clone());
        let session = Session::new();
        let service = GameService::new(
            Arc::new(CatalogDeckProvider::new(StaticCardCatalog::numbered(32))),
            persistence,
            saves,
            session.handle(),
            notifications,
            GameSettings {
                resolve_delay: Duration::from_millis(1000),
                default_grid_size: 4,
            },
        );
        (service, session)
    }

    fn pair_indices(state: &GameState) -> (usize, usize, usize) {
        let first = 0;
        let partner = state
            .cards
            .iter()
            .enumerate()
            .position(|(index, card)| index != first && card.set == state.cards[first].set)
            .unwrap();
        let stranger = state
            .cards
            .iter()
            .position(|card| card.set != state.cards[first].set)
            .unwrap();
        (first, partner, stranger)
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_reverts_after_delay() {
        let (service, _session) = service();
        service.initialize_cards(4).await.unwrap();
        let (first, _partner, stranger) = pair_indices(&service.snapshot().await);

        service.handle_card_click(first).await;
        assert!(matches!(
            service.handle_card_click(stranger).await,
            ClickOutcome::Mismatched { .. }
        ));
        assert!(service.snapshot().await.lock_board);

        service.settle().await;
        let state = service.snapshot().await;
        assert!(!state.lock_board);
        assert!(state.cards.iter().all(|card| !card.exposed));
        assert_eq!(state.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn redeal_drops_pending_revert() {
        let (service, _session) = service();
        service.initialize_cards(4).await.unwrap();
        let (first, _partner, stranger) = pair_indices(&service.snapshot().await);
        service.handle_card_click(first).await;
        service.handle_card_click(stranger).await;

        service.initialize_cards(8).await.unwrap();
        service.settle().await;

        let state = service.snapshot().await;
        assert_eq!(state.cards.len(), 8);
        assert_eq!(state.attempts, 0);
        assert!(!state.lock_board);
    }

    #[tokio::test]
    async fn rejects_odd_grid_sizes() {
        let (service, _session) = service();
        assert!(matches!(
            service.initialize_cards(5).await,
            Err(GameError::InvalidGridSize(5))
        ));
    }
}
