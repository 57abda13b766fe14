//! memory-match demo entrypoint: wires the collaborators, optionally signs in and plays one board.

use std::{env, sync::Arc};

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memory_match::{
    config::AppConfig,
    dao::{
        document_store::{DocumentStore, MemoryDocumentStore},
        file_store::DirectoryFileStore,
        local_storage::DirectoryLocalStorage,
    },
    error::AuthError,
    providers::{
        auth::MemoryAuthProvider,
        deck::{CatalogDeckProvider, DeckProvider, StaticCardCatalog},
    },
    state::{AppState, Collaborators, SharedState, engine::TurnPhase},
};

#[cfg(feature = "http-deck")]
const OFFLINE_ENV: &str = "MEMORY_MATCH_OFFLINE";
const EMAIL_ENV: &str = "MEMORY_MATCH_EMAIL";
const PASSWORD_ENV: &str = "MEMORY_MATCH_PASSWORD";
const OFFLINE_CATALOG_SETS: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let collaborators = Collaborators {
        auth: Arc::new(MemoryAuthProvider::new()),
        deck: deck_provider(&config),
        documents: document_store().await?,
        files: Arc::new(DirectoryFileStore::new(config.file_store_dir())),
        local: Arc::new(DirectoryLocalStorage::new(config.local_storage_dir())),
    };
    let grid_size = config.default_grid_size;
    let state = AppState::new(config, collaborators);

    tokio::spawn(log_notifications(state.clone()));
    state.start().await;
    state
        .session()
        .ready()
        .await
        .context("waiting for the initial session")?;

    if let (Ok(email), Ok(password)) = (env::var(EMAIL_ENV), env::var(PASSWORD_ENV)) {
        sign_in(&state, &email, &password).await?;
    } else {
        state
            .game()
            .ensure_loaded()
            .await
            .context("loading local game state")?;
    }

    state
        .game()
        .initialize_cards(grid_size)
        .await
        .context("dealing the board")?;
    autoplay(&state).await;

    let results = state
        .game()
        .fetch_results()
        .await
        .context("fetching results")?;
    for result in &results {
        info!(
            date = %result.date,
            attempts = result.attempts,
            grid_size = result.grid_size,
            score = result.score,
            "result"
        );
    }

    state.session().stop().await;
    Ok(())
}

/// Sign in, creating the account on first use.
async fn sign_in(state: &SharedState, email: &str, password: &str) -> anyhow::Result<()> {
    match state.session().login(email, password).await {
        Ok(identity) => info!(uid = %identity.uid, "logged in"),
        Err(AuthError::InvalidCredentials) => {
            let identity = state
                .session()
                .signup(email, password)
                .await
                .context("creating account")?;
            info!(uid = %identity.uid, "account created");
        }
        Err(err) => return Err(err).context("logging in"),
    }
    Ok(())
}

/// Play the current board to completion, one known pair at a time.
async fn autoplay(state: &SharedState) {
    let game = state.game();
    let resolve_delay = state.config().resolve_delay;
    loop {
        match game.phase().await {
            TurnPhase::Idle => {}
            TurnPhase::FirstSelected => game.reset_state().await,
            TurnPhase::Matching => {
                debug!("board locked; waiting for the pending comparison");
                sleep(resolve_delay).await;
                continue;
            }
        }
        let snapshot = game.snapshot().await;
        if snapshot.is_complete() {
            break;
        }
        let Some(first) = snapshot.cards.iter().position(|card| !card.exposed) else {
            break;
        };
        let Some(second) = snapshot
            .cards
            .iter()
            .enumerate()
            .position(|(index, card)| {
                index != first && !card.exposed && card.set == snapshot.cards[first].set
            })
        else {
            warn!(index = first, "card has no hidden partner; stopping");
            break;
        };
        game.handle_card_click(first).await;
        game.handle_card_click(second).await;
    }
    game.settle().await;
    info!(attempts = game.snapshot().await.attempts, "board finished");
}

fn deck_provider(#[allow(unused_variables)] config: &AppConfig) -> Arc<dyn DeckProvider> {
    #[cfg(feature = "http-deck")]
    {
        use memory_match::providers::deck::HttpCardCatalog;

        if env::var_os(OFFLINE_ENV).is_none() {
            info!(url = %config.catalog_url, "using HTTP card catalog");
            return Arc::new(CatalogDeckProvider::new(HttpCardCatalog::new(
                config.catalog_url.clone(),
            )));
        }
    }

    info!(sets = OFFLINE_CATALOG_SETS, "using built-in card catalog");
    Arc::new(CatalogDeckProvider::new(StaticCardCatalog::numbered(
        OFFLINE_CATALOG_SETS,
    )))
}

async fn document_store() -> anyhow::Result<Arc<dyn DocumentStore>> {
    #[cfg(feature = "couch-store")]
    {
        use memory_match::dao::document_store::couchdb::{CouchConfig, CouchDocumentStore};

        if let Some(couch_config) = CouchConfig::from_env() {
            info!(base_url = %couch_config.base_url, database = %couch_config.database, "connecting to CouchDB");
            let store = CouchDocumentStore::connect(couch_config)
                .await
                .context("connecting to CouchDB")?;
            info!("using CouchDB document store");
            return Ok(Arc::new(store));
        }
    }

    info!("in-memory document store; documents are lost on exit");
    Ok(Arc::new(MemoryDocumentStore::new()))
}

async fn log_notifications(state: SharedState) {
    let mut notifications = state.notifications().subscribe();
    loop {
        match notifications.recv().await {
            Ok(notification) => info!(
                kind = ?notification.kind,
                duration_ms = notification.duration.as_millis() as u64,
                "{}",
                notification.message
            ),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use memory_match::{
        dao::{file_store::MemoryFileStore, local_storage::MemoryLocalStorage},
        state::engine::ClickOutcome,
    };

    use super::*;

    fn app() -> SharedState {
        AppState::new(
            AppConfig {
                default_grid_size: 4,
                resolve_delay: Duration::from_millis(1000),
                ..AppConfig::default()
            },
            Collaborators {
                auth: Arc::new(MemoryAuthProvider::new()),
                deck: Arc::new(CatalogDeckProvider::new(StaticCardCatalog::numbered(8))),
                documents: Arc::new(MemoryDocumentStore::new()),
                files: Arc::new(MemoryFileStore::new("https://files.example.com")),
                local: Arc::new(MemoryLocalStorage::new()),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_waits_out_a_locked_board() {
        let state = app();
        state.start().await;
        state.session().ready().await.unwrap();
        let game = state.game();
        game.initialize_cards(4).await.unwrap();

        let board = game.snapshot().await;
        let stranger = board
            .cards
            .iter()
            .position(|card| card.set != board.cards[0].set)
            .unwrap();
        game.handle_card_click(0).await;
        assert!(matches!(
            game.handle_card_click(stranger).await,
            ClickOutcome::Mismatched { .. }
        ));

        autoplay(&state).await;

        let finished = game.snapshot().await;
        assert!(finished.is_complete());
        assert_eq!(finished.attempts, 3);
        assert_eq!(finished.results.len(), 1);
    }
}
