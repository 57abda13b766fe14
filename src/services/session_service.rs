use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    error::AuthError,
    providers::auth::AuthProvider,
    services::{
        game_service::GameService, notifications::NotificationHub,
        profile_service::ProfileSynchronizer,
    },
    state::session::{Identity, Session, SessionHandle},
};

/// Where the session stands after the last reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// The first provider notification has not been handled yet, or a
    /// transition is being applied.
    Resolving,
    /// Identity set, profile and game state loaded.
    SignedIn(Identity),
    /// No identity, game state cleared.
    SignedOut,
}

/// Owns the session and reconciles every identity transition pushed by the
/// authentication provider.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    auth: Arc<dyn AuthProvider>,
    session: Session,
    game: GameService,
    profile: ProfileSynchronizer,
    notifications: NotificationHub,
    phase: watch::Sender<SessionPhase>,
    confirmation_timeout: Duration,
    settled: Mutex<Option<Option<Identity>>>,
    reconciler: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    /// Take ownership of `session`; nothing happens until [`SessionStore::start`].
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        session: Session,
        game: GameService,
        profile: ProfileSynchronizer,
        notifications: NotificationHub,
        confirmation_timeout: Duration,
    ) -> Self {
        let (phase, _rx) = watch::channel(SessionPhase::Resolving);
        Self {
            inner: Arc::new(SessionInner {
                auth,
                session,
                game,
                profile,
                notifications,
                phase,
                confirmation_timeout,
                settled: Mutex::new(None),
                reconciler: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to the provider and spawn the reconciliation task. The first
    /// iteration handles the identity resolved at startup. Later calls are no-ops.
    pub async fn start(&self) {
        let mut reconciler = self.inner.reconciler.lock().await;
        if reconciler.is_some() {
            return;
        }
        let mut identities = self.inner.auth.watch();
        let store = self.clone();
        *reconciler = Some(tokio::spawn(async move {
            loop {
                let identity = identities.borrow_and_update().clone();
                store.reconcile(identity).await;
                if identities.changed().await.is_err() {
                    debug!("auth provider closed its identity channel");
                    break;
                }
            }
        }));
        info!("session reconciler started");
    }

    /// Stop following the provider.
    pub async fn stop(&self) {
        if let Some(handle) = self.inner.reconciler.lock().await.take() {
            handle.abort();
        }
    }

    /// Apply an identity transition. Repeated notifications for the settled
    /// identity are ignored.
    pub async fn reconcile(&self, identity: Option<Identity>) {
        let mut settled = self.inner.settled.lock().await;
        if settled.as_ref() == Some(&identity) {
            debug!(identity = ?identity, "identity already reconciled");
            return;
        }
        self.inner.phase.send_replace(SessionPhase::Resolving);

        let phase = match &identity {
            Some(user) => {
                self.inner.game.clear().await;
                self.inner.session.set(Some(user.clone()));
                if let Err(err) = self.inner.profile.load(user).await {
                    warn!(uid = %user.uid, error = %err, "failed to load profile");
                    self.inner
                        .notifications
                        .danger(format!("Could not load profile: {err}"));
                }
                if let Err(err) = self.inner.game.load_state().await {
                    warn!(uid = %user.uid, error = %err, "failed to load game state");
                    self.inner
                        .notifications
                        .danger(format!("Could not load your game: {err}"));
                }
                info!(uid = %user.uid, "signed in");
                SessionPhase::SignedIn(user.clone())
            }
            None => {
                self.inner.session.set(None);
                self.inner.profile.stop().await;
                self.inner.game.clear().await;
                info!("signed out");
                SessionPhase::SignedOut
            }
        };

        *settled = Some(identity);
        self.inner.phase.send_replace(phase);
    }

    /// Sign in and wait until the session reflects the new identity.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let identity = self.inner.auth.sign_in(email, password).await?;
        self.await_signed_in(&identity).await?;
        Ok(identity)
    }

    /// Create an account and wait until the session reflects it.
    pub async fn signup(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let identity = self.inner.auth.sign_up(email, password).await?;
        self.await_signed_in(&identity).await?;
        Ok(identity)
    }

    /// Sign out and wait until the session is cleared.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.inner.auth.sign_out().await?;
        self.await_phase(|phase| *phase == SessionPhase::SignedOut)
            .await
    }

    /// [`SessionStore::login`] reduced to success or failure.
    pub async fn login_ok(&self, email: &str, password: &str) -> bool {
        self.login(email, password)
            .await
            .inspect_err(|err| warn!(error = %err, "login failed"))
            .is_ok()
    }

    /// [`SessionStore::signup`] reduced to success or failure.
    pub async fn signup_ok(&self, email: &str, password: &str) -> bool {
        self.signup(email, password)
            .await
            .inspect_err(|err| warn!(error = %err, "signup failed"))
            .is_ok()
    }

    /// [`SessionStore::logout`] reduced to success or failure.
    pub async fn logout_ok(&self) -> bool {
        self.logout()
            .await
            .inspect_err(|err| warn!(error = %err, "logout failed"))
            .is_ok()
    }

    /// Identity of the reconciled session.
    pub fn current_identity(&self) -> Option<Identity> {
        self.inner.session.current()
    }

    /// Read-only session view.
    pub fn handle(&self) -> SessionHandle {
        self.inner.session.handle()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.inner.phase.borrow().clone()
    }

    /// Follow phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.subscribe()
    }

    /// Wait until the first reconciliation settled.
    pub async fn ready(&self) -> Result<SessionPhase, AuthError> {
        self.await_phase(|phase| *phase != SessionPhase::Resolving)
            .await?;
        Ok(self.phase())
    }

    async fn await_signed_in(&self, identity: &Identity) -> Result<(), AuthError> {
        self.await_phase(|phase| matches!(phase, SessionPhase::SignedIn(user) if user == identity))
            .await
    }

    async fn await_phase(
        &self,
        predicate: impl FnMut(&SessionPhase) -> bool,
    ) -> Result<(), AuthError> {
        let mut phases = self.inner.phase.subscribe();
        match timeout(self.inner.confirmation_timeout, phases.wait_for(predicate)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) | Err(_) => {
                warn!(
                    timeout_ms = self.inner.confirmation_timeout.as_millis() as u64,
                    "session did not settle in time"
                );
                Err(AuthError::ConfirmationTimeout)
            }
        }
    }
}
