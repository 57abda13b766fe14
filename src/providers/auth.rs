use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::{error::AuthError, state::session::Identity};

/// Shortest password the in-memory provider accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// External authentication provider.
///
/// Besides the request/response calls, the provider pushes its current
/// identity through [`AuthProvider::watch`]: the receiver starts with the
/// identity resolved at startup and changes once per transition.
pub trait AuthProvider: Send + Sync {
    /// Sign in with email and password.
    fn sign_in(&self, email: &str, password: &str) -> BoxFuture<'static, Result<Identity, AuthError>>;
    /// Create an account and sign it in.
    fn sign_up(&self, email: &str, password: &str) -> BoxFuture<'static, Result<Identity, AuthError>>;
    /// End the provider session.
    fn sign_out(&self) -> BoxFuture<'static, Result<(), AuthError>>;
    /// Confirm the password of the signed-in account.
    fn reauthenticate(
        &self,
        identity: &Identity,
        password: &str,
    ) -> BoxFuture<'static, Result<(), AuthError>>;
    /// Replace the password of the signed-in account.
    fn update_password(
        &self,
        identity: &Identity,
        new_password: &str,
    ) -> BoxFuture<'static, Result<(), AuthError>>;
    /// Ambient identity notifications.
    fn watch(&self) -> watch::Receiver<Option<Identity>>;
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    password: String,
}

/// Provider keeping accounts in memory; used by tests and the offline demo.
#[derive(Clone)]
pub struct MemoryAuthProvider {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    accounts: DashMap<String, Account>,
    current: watch::Sender<Option<Identity>>,
    offline: AtomicBool,
}

impl MemoryAuthProvider {
    /// Provider with no account and no session.
    pub fn new() -> Self {
        let (current, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(AuthInner {
                accounts: DashMap::new(),
                current,
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Create an account without signing it in.
    pub fn register(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.inner.create_account(email, password)
    }

    /// Simulate losing connectivity: every call fails with [`AuthError::Network`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthInner {
    fn ensure_online(&self) -> Result<(), AuthError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(AuthError::Network("provider offline".into()))
        } else {
            Ok(())
        }
    }

    fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        match self.accounts.entry(email.clone()) {
            dashmap::Entry::Occupied(_) => Err(AuthError::EmailInUse(email)),
            dashmap::Entry::Vacant(slot) => {
                let uid = Uuid::new_v4().simple().to_string();
                slot.insert(Account {
                    uid: uid.clone(),
                    password: password.to_string(),
                });
                Ok(Identity::new(uid, email))
            }
        }
    }

    fn check_password(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        let account = self
            .accounts
            .get(&email)
            .ok_or(AuthError::InvalidCredentials)?;
        if account.password != password {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(Identity::new(account.uid.clone(), email))
    }

    /// Publish `identity`, notifying watchers only on an actual transition.
    fn publish(&self, identity: Option<Identity>) {
        self.current.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            debug!(identity = ?identity, "auth provider identity changed");
            *current = identity;
            true
        });
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AuthProvider for MemoryAuthProvider {
    fn sign_in(&self, email: &str, password: &str) -> BoxFuture<'static, Result<Identity, AuthError>> {
        let inner = self.inner.clone();
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move {
            inner.ensure_online()?;
            let identity = inner.check_password(&email, &password)?;
            inner.publish(Some(identity.clone()));
            Ok(identity)
        })
    }

    fn sign_up(&self, email: &str, password: &str) -> BoxFuture<'static, Result<Identity, AuthError>> {
        let inner = self.inner.clone();
        let email = email.to_string();
        let password = password.to_string();
        Box::pin(async move {
            inner.ensure_online()?;
            let identity = inner.create_account(&email, &password)?;
            inner.publish(Some(identity.clone()));
            Ok(identity)
        })
    }

    fn sign_out(&self) -> BoxFuture<'static, Result<(), AuthError>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            inner.publish(None);
            Ok(())
        })
    }

    fn reauthenticate(
        &self,
        identity: &Identity,
        password: &str,
    ) -> BoxFuture<'static, Result<(), AuthError>> {
        let inner = self.inner.clone();
        let identity = identity.clone();
        let password = password.to_string();
        Box::pin(async move {
            inner.ensure_online()?;
            let confirmed = inner.check_password(&identity.email, &password)?;
            if confirmed.uid != identity.uid {
                return Err(AuthError::InvalidCredentials);
            }
            Ok(())
        })
    }

    fn update_password(
        &self,
        identity: &Identity,
        new_password: &str,
    ) -> BoxFuture<'static, Result<(), AuthError>> {
        let inner = self.inner.clone();
        let identity = identity.clone();
        let new_password = new_password.to_string();
        Box::pin(async move {
            inner.ensure_online()?;
            if inner.current.borrow().as_ref() != Some(&identity) {
                return Err(AuthError::NotSignedIn);
            }
            if new_password.chars().count() < MIN_PASSWORD_LEN {
                return Err(AuthError::WeakPassword);
            }
            let mut account = inner
                .accounts
                .get_mut(&identity.email)
                .ok_or(AuthError::NotSignedIn)?;
            account.password = new_password;
            Ok(())
        })
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = MemoryAuthProvider::new();
        let created = auth.sign_up("Ada@Example.com", "secret1").await.unwrap();
        assert_eq!(created.email, "ada@example.com");

        auth.sign_out().await.unwrap();
        let signed_in = auth.sign_in("ada@example.com", "secret1").await.unwrap();
        assert_eq!(signed_in, created);
    }

    #[tokio::test]
    async fn rejects_bad_credentials_and_duplicates() {
        let auth = MemoryAuthProvider::new();
        auth.register("ada@example.com", "secret1").unwrap();

        assert_eq!(
            auth.sign_in("ada@example.com", "wrong").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert!(matches!(
            auth.sign_up("ada@example.com", "secret2").await.unwrap_err(),
            AuthError::EmailInUse(_)
        ));
        assert_eq!(
            auth.sign_up("bob@example.com", "123").await.unwrap_err(),
            AuthError::WeakPassword
        );
    }

    #[tokio::test]
    async fn watch_changes_once_per_transition() {
        let auth = MemoryAuthProvider::new();
        let mut rx = auth.watch();
        assert!(rx.borrow_and_update().is_none());

        auth.sign_up("ada@example.com", "secret1").await.unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        auth.sign_in("ada@example.com", "secret1").await.unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn offline_provider_reports_network_errors() {
        let auth = MemoryAuthProvider::new();
        auth.set_offline(true);
        assert!(matches!(
            auth.sign_in("ada@example.com", "secret1").await.unwrap_err(),
            AuthError::Network(_)
        ));
    }
}
