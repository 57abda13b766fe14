/// Pure game transitions.
pub mod engine;
/// Game data model.
pub mod game;
/// User profile data model.
pub mod profile;
/// Current identity shared with storage code.
pub mod session;

use std::sync::Arc;

use tracing::info;

use crate::{
    config::AppConfig,
    dao::{document_store::DocumentStore, file_store::FileStore, local_storage::LocalStorage},
    providers::{auth::AuthProvider, deck::DeckProvider},
    services::{
        game_service::{GameService, GameSettings},
        notifications::NotificationHub,
        persistence::{PersistenceAdapter, SaveQueue},
        profile_service::ProfileSynchronizer,
        session_service::SessionStore,
    },
};

use self::session::Session;

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// External collaborators injected into [`AppState::new`].
#[derive(Clone)]
pub struct Collaborators {
    /// Authentication provider.
    pub auth: Arc<dyn AuthProvider>,
    /// Source of shuffled boards.
    pub deck: Arc<dyn DeckProvider>,
    /// Remote per-identity documents.
    pub documents: Arc<dyn DocumentStore>,
    /// Avatar storage.
    pub files: Arc<dyn FileStore>,
    /// Anonymous game state storage.
    pub local: Arc<dyn LocalStorage>,
}

/// Composition root holding every store of the application.
pub struct AppState {
    config: AppConfig,
    notifications: NotificationHub,
    game: GameService,
    profile: ProfileSynchronizer,
    session: SessionStore,
}

impl AppState {
    /// Construct the stores and wire them together. Must run inside a Tokio
    /// runtime: the save queue spawns its writer task here.
    pub fn new(config: AppConfig, collaborators: Collaborators) -> SharedState {
        let Collaborators {
            auth,
            deck,
            documents,
            files,
            local,
        } = collaborators;

        let notifications = NotificationHub::new();
        let session = Session::new();

        let persistence = Arc::new(PersistenceAdapter::new(
            documents.clone(),
            local,
            config.local_storage_key.clone(),
        ));
        let saves = SaveQueue::spawn(persistence.clone(), notifications.clone());

        let game = GameService::new(
            deck,
            persistence,
            saves,
            session.handle(),
            notifications.clone(),
            GameSettings::from(&config),
        );
        let profile = ProfileSynchronizer::new(
            documents,
            files,
            auth.clone(),
            session.handle(),
            notifications.clone(),
            config.default_avatar_url.clone(),
        );
        let session = SessionStore::new(
            auth,
            session,
            game.clone(),
            profile.clone(),
            notifications.clone(),
            config.auth_confirmation_timeout,
        );

        info!(
            grid_size = config.default_grid_size,
            resolve_delay_ms = config.resolve_delay.as_millis() as u64,
            "application state constructed"
        );

        Arc::new(Self {
            config,
            notifications,
            game,
            profile,
            session,
        })
    }

    /// Start reconciling authentication transitions.
    pub async fn start(&self) {
        self.session.start().await;
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Notification hub UIs subscribe to.
    pub fn notifications(&self) -> &NotificationHub {
        &self.notifications
    }

    /// Game state owner.
    pub fn game(&self) -> &GameService {
        &self.game
    }

    /// Profile synchronizer.
    pub fn profile(&self) -> &ProfileSynchronizer {
        &self.profile
    }

    /// Session store.
    pub fn session(&self) -> &SessionStore {
        &self.session
    }
}
