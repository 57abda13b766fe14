use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::{models::MalformedDocumentError, storage::StorageError};

/// Failures reported by the authentication provider or while waiting for the
/// session to settle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Unknown email or wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// Sign-up with an email that already has an account.
    #[error("email `{0}` is already registered")]
    EmailInUse(String),
    /// Password rejected by the provider's policy.
    #[error("password is too weak")]
    WeakPassword,
    /// Operation requires a signed-in account.
    #[error("no user is signed in")]
    NotSignedIn,
    /// Provider could not be reached.
    #[error("authentication provider unreachable: {0}")]
    Network(String),
    /// The provider accepted the request but the session never reflected it.
    #[error("timed out waiting for the session to change")]
    ConfirmationTimeout,
}

/// Failures while producing a shuffled board.
#[derive(Debug, Error)]
pub enum DeckError {
    /// The card catalog could not be fetched.
    #[error("failed to fetch card catalog")]
    Fetch {
        /// Transport or decoding failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The catalog holds fewer sets than the board needs.
    #[error("card catalog has {available} sets, board needs {required}")]
    CatalogTooSmall {
        /// Sets needed.
        required: usize,
        /// Sets in the catalog.
        available: usize,
    },
    /// Requested board size cannot be dealt.
    #[error("grid size {0} cannot be dealt")]
    InvalidGridSize(usize),
}

/// Failures of the save/load paths. Saves are best effort; loads surface them.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Stored state does not match its schema.
    #[error(transparent)]
    Malformed(#[from] MalformedDocumentError),
    /// State could not be serialized.
    #[error("failed to encode game state")]
    Encode(#[source] serde_json::Error),
}

/// Errors returned by game operations.
#[derive(Debug, Error)]
pub enum GameError {
    /// Deck provider failure, propagated unchanged.
    #[error(transparent)]
    Deck(#[from] DeckError),
    /// Board size must be even and between 4 and 64.
    #[error("invalid grid size {0}")]
    InvalidGridSize(usize),
    /// Loading state from storage failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors returned by profile operations; every step of an update fails with
/// its own variant.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No identity is signed in.
    #[error("no user is signed in")]
    NoIdentity,
    /// Input rejected before contacting any backend.
    #[error("invalid profile update: {0}")]
    Validation(String),
    /// Re-authentication with the old password failed.
    #[error("incorrect old password")]
    IncorrectOldPassword,
    /// Re-authentication failed for another reason than a wrong password.
    #[error("could not confirm the old password")]
    Reauthentication(#[source] AuthError),
    /// The provider refused the new password.
    #[error("failed to change password")]
    PasswordChange(#[source] AuthError),
    /// Avatar upload or URL resolution failed.
    #[error("failed to upload avatar")]
    AvatarUpload(#[source] StorageError),
    /// Reading or writing the profile document failed.
    #[error("profile storage failed")]
    Storage(#[source] StorageError),
    /// The stored profile does not match its schema.
    #[error(transparent)]
    Malformed(#[from] MalformedDocumentError),
}

impl From<ValidationErrors> for ProfileError {
    fn from(err: ValidationErrors) -> Self {
        ProfileError::Validation(format!("validation failed: {}", err))
    }
}
