use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Authenticated user reference used to key every per-user document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable account identifier.
    pub uid: String,
    /// Email the account signed in with.
    pub email: String,
}

impl Identity {
    /// Build an identity from its parts.
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.uid, self.email)
    }
}

/// Writable side of the current session, owned by the session store.
pub struct Session {
    identity: watch::Sender<Option<Identity>>,
}

impl Session {
    /// Start without an identity.
    pub fn new() -> Self {
        let (identity, _rx) = watch::channel(None);
        Self { identity }
    }

    /// Replace the current identity.
    pub(crate) fn set(&self, identity: Option<Identity>) {
        self.identity.send_replace(identity);
    }

    /// Current identity, if any.
    pub fn current(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    /// Read-only handle for collaborators that key data by identity.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            identity: self.identity.subscribe(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the session shared with persistence and profile code.
#[derive(Clone)]
pub struct SessionHandle {
    identity: watch::Receiver<Option<Identity>>,
}

impl SessionHandle {
    /// Current identity, if any.
    pub fn current(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }
}
