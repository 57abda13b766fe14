#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use memory_match::{
    config::AppConfig,
    dao::{
        document_store::MemoryDocumentStore,
        file_store::MemoryFileStore,
        local_storage::{LocalStorage, MemoryLocalStorage},
        storage::{StorageError, StorageResult},
    },
    error::DeckError,
    providers::{
        auth::MemoryAuthProvider,
        deck::{CatalogDeckProvider, DeckProvider, StaticCardCatalog},
    },
    state::{
        AppState, Collaborators, SharedState,
        game::{Card, GameState},
    },
};

pub const RESOLVE_DELAY: Duration = Duration::from_millis(1000);

pub struct Harness {
    pub state: SharedState,
    pub auth: MemoryAuthProvider,
    pub documents: MemoryDocumentStore,
    pub files: MemoryFileStore,
    pub local: MemoryLocalStorage,
}

pub fn config() -> AppConfig {
    AppConfig {
        default_grid_size: 4,
        resolve_delay: RESOLVE_DELAY,
        auth_confirmation_timeout: Duration::from_secs(5),
        default_avatar_url: "https://example.com/default.svg".into(),
        ..AppConfig::default()
    }
}

impl Harness {
    /// Fresh collaborators, not started.
    pub fn new() -> Self {
        Self::with_parts(
            MemoryAuthProvider::new(),
            MemoryDocumentStore::new(),
            MemoryLocalStorage::new(),
        )
    }

    /// Build on existing collaborators, e.g. to simulate an app restart.
    pub fn with_parts(
        auth: MemoryAuthProvider,
        documents: MemoryDocumentStore,
        local: MemoryLocalStorage,
    ) -> Self {
        let files = MemoryFileStore::new("https://files.example.com");
        let state = AppState::new(
            config(),
            Collaborators {
                auth: Arc::new(auth.clone()),
                deck: Arc::new(CatalogDeckProvider::new(StaticCardCatalog::numbered(40))),
                documents: Arc::new(documents.clone()),
                files: Arc::new(files.clone()),
                local: Arc::new(local.clone()),
            },
        );
        Self {
            state,
            auth,
            documents,
            files,
            local,
        }
    }

    /// Start reconciliation and wait for the initial phase.
    pub async fn started(self) -> Self {
        self.state.start().await;
        self.state.session().ready().await.unwrap();
        self
    }
}

/// Started app over in-memory stores with its own deck and local storage.
pub async fn app_with(deck: Arc<dyn DeckProvider>, local: Arc<dyn LocalStorage>) -> SharedState {
    let state = AppState::new(
        config(),
        Collaborators {
            auth: Arc::new(MemoryAuthProvider::new()),
            deck,
            documents: Arc::new(MemoryDocumentStore::new()),
            files: Arc::new(MemoryFileStore::new("https://files.example.com")),
            local,
        },
    );
    state.start().await;
    state.session().ready().await.unwrap();
    state
}

/// Deck that deals normally until switched off.
#[derive(Clone)]
pub struct SwitchableDeck {
    inner: Arc<CatalogDeckProvider<StaticCardCatalog>>,
    failing: Arc<AtomicBool>,
}

impl SwitchableDeck {
    pub fn new(failing: bool) -> Self {
        Self {
            inner: Arc::new(CatalogDeckProvider::new(StaticCardCatalog::numbered(40))),
            failing: Arc::new(AtomicBool::new(failing)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DeckProvider for SwitchableDeck {
    fn initialize_cards(&self, grid_size: usize) -> BoxFuture<'static, Result<Vec<Card>, DeckError>> {
        if self.failing.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(DeckError::Fetch {
                    source: std::io::Error::other("catalog offline").into(),
                })
            });
        }
        self.inner.initialize_cards(grid_size)
    }
}

/// Local storage that reads nothing and rejects every write.
pub struct ReadOnlyLocalStorage;

impl LocalStorage for ReadOnlyLocalStorage {
    fn set_item(&self, key: &str, _value: String) -> BoxFuture<'static, StorageResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            Err(StorageError::unavailable(
                format!("writing {key}"),
                std::io::Error::other("disk full"),
            ))
        })
    }

    fn get_item(&self, _key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        Box::pin(async { Ok(None) })
    }
}

/// Partner of the card at `first` and a card of another set.
pub fn pair_indices(state: &GameState, first: usize) -> (usize, usize) {
    let set = &state.cards[first].set;
    let partner = state
        .cards
        .iter()
        .enumerate()
        .position(|(index, card)| index != first && &card.set == set)
        .unwrap();
    let stranger = state
        .cards
        .iter()
        .position(|card| &card.set != set)
        .unwrap();
    (partner, stranger)
}
