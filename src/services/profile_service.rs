use std::sync::{Arc, Weak};

use serde_json::{Map, Value};
use time::Date;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::{
        document_store::DocumentStore,
        file_store::FileStore,
        models::{
            FIELD_AVATAR_URL, FIELD_BIRTHDATE, FIELD_DISPLAY_NAME, decode_profile,
            format_birthdate, profile_doc_path,
        },
        storage::StorageError,
    },
    error::{AuthError, ProfileError},
    providers::auth::AuthProvider,
    services::notifications::NotificationHub,
    state::{
        profile::UserProfile,
        session::{Identity, SessionHandle},
    },
};

/// Image uploaded as the new avatar.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    /// Name of the file, stored as `avatars/{uid}/{file_name}`.
    pub file_name: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

impl Validate for AvatarUpload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(err) = validate_file_name(&self.file_name) {
            errors.add("file_name", err);
        }
        if self.bytes.is_empty() {
            errors.add("bytes", ValidationError::new("empty_avatar"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Single path segment made of printable characters.
fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_file_name"))
    }
}

/// Changes requested from the account screen; `None` leaves a field as is.
#[derive(Debug, Clone, Default, Validate)]
pub struct ProfileUpdate {
    /// New display name.
    #[validate(length(max = 64))]
    pub display_name: Option<String>,
    /// New birthdate.
    pub birthdate: Option<Date>,
    /// Current password, required together with `new_password`.
    pub old_password: Option<String>,
    /// Replacement password.
    #[validate(length(min = 6))]
    pub new_password: Option<String>,
    /// Replacement avatar.
    pub avatar: Option<AvatarUpload>,
}

impl ProfileUpdate {
    fn check(&self) -> Result<(), ProfileError> {
        self.validate()?;
        if let Some(avatar) = &self.avatar {
            avatar.validate()?;
        }
        match (&self.old_password, &self.new_password) {
            (Some(old), Some(new)) if old == new => Err(ProfileError::Validation(
                "new password must differ from the old one".into(),
            )),
            (Some(_), None) | (None, Some(_)) => Err(ProfileError::Validation(
                "old and new password must be provided together".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Keeps the profile of the signed-in user loaded and in sync with remote
/// changes for the lifetime of the session.
#[derive(Clone)]
pub struct ProfileSynchronizer {
    inner: Arc<ProfileInner>,
}

struct ProfileInner {
    documents: Arc<dyn DocumentStore>,
    files: Arc<dyn FileStore>,
    auth: Arc<dyn AuthProvider>,
    session: SessionHandle,
    notifications: NotificationHub,
    default_avatar_url: String,
    profile: watch::Sender<Option<UserProfile>>,
    subscription: Mutex<Option<JoinHandle<()>>>,
}

impl ProfileSynchronizer {
    /// Wire the synchronizer; new profiles get `default_avatar_url`.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        files: Arc<dyn FileStore>,
        auth: Arc<dyn AuthProvider>,
        session: SessionHandle,
        notifications: NotificationHub,
        default_avatar_url: impl Into<String>,
    ) -> Self {
        let (profile, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(ProfileInner {
                documents,
                files,
                auth,
                session,
                notifications,
                default_avatar_url: default_avatar_url.into(),
                profile,
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Load the profile of `identity`, creating it with defaults when missing,
    /// and follow its remote changes until [`ProfileSynchronizer::stop`].
    pub async fn load(&self, identity: &Identity) -> Result<UserProfile, ProfileError> {
        let mut subscription = self.inner.subscription.lock().await;
        if let Some(previous) = subscription.take() {
            previous.abort();
        }

        let path = profile_doc_path(&identity.uid);
        let profile = match self
            .inner
            .documents
            .get(&path)
            .await
            .map_err(ProfileError::Storage)?
        {
            Some(document) => decode_profile(&path, document)?,
            None => {
                let profile = UserProfile::with_defaults(&self.inner.default_avatar_url);
                self.inner
                    .documents
                    .set_merge(&path, profile_fields(&profile))
                    .await
                    .map_err(ProfileError::Storage)?;
                info!(uid = %identity.uid, "created default profile");
                profile
            }
        };
        self.inner.profile.send_replace(Some(profile.clone()));

        let mut watch = self
            .inner
            .documents
            .subscribe(&path)
            .await
            .map_err(ProfileError::Storage)?;
        let weak: Weak<ProfileInner> = Arc::downgrade(&self.inner);
        *subscription = Some(tokio::spawn(async move {
            while let Some(document) = watch.next().await {
                let Some(inner) = weak.upgrade() else { break };
                match decode_profile(&path, document) {
                    Ok(profile) => {
                        debug!(path = %path, "remote profile update");
                        inner.profile.send_replace(Some(profile));
                    }
                    Err(err) => {
                        warn!(path = %path, error = %err, "skipping malformed profile update");
                    }
                }
            }
        }));

        Ok(profile)
    }

    /// Load the profile of the current session. Failures, including the absence
    /// of a signed-in user, are logged and notified rather than returned.
    pub async fn load_current(&self) -> Option<UserProfile> {
        let result = match self.inner.session.current() {
            Some(identity) => self.load(&identity).await,
            None => Err(ProfileError::NoIdentity),
        };
        match result {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!(error = %err, "failed to load profile");
                self.inner.notifications.danger(format!("Could not load profile: {err}"));
                None
            }
        }
    }

    /// End the remote subscription and forget the loaded profile.
    pub async fn stop(&self) {
        if let Some(handle) = self.inner.subscription.lock().await.take() {
            handle.abort();
            debug!("profile subscription stopped");
        }
        self.inner.profile.send_replace(None);
    }

    /// Currently loaded profile.
    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.profile.borrow().clone()
    }

    /// Follow profile changes, local and remote.
    pub fn subscribe(&self) -> watch::Receiver<Option<UserProfile>> {
        self.inner.profile.subscribe()
    }

    /// Apply `update` step by step: validation, password change, avatar
    /// upload, then one document update. The first failing step aborts the
    /// rest with its own error.
    pub async fn update_user_profile(
        &self,
        update: ProfileUpdate,
    ) -> Result<UserProfile, ProfileError> {
        let identity = self.inner.session.current().ok_or(ProfileError::NoIdentity)?;
        update.check()?;

        if let (Some(old), Some(new)) = (&update.old_password, &update.new_password) {
            self.inner
                .auth
                .reauthenticate(&identity, old)
                .await
                .map_err(|err| {
                    debug!(uid = %identity.uid, error = %err, "re-authentication failed");
                    match err {
                        AuthError::InvalidCredentials => ProfileError::IncorrectOldPassword,
                        other => ProfileError::Reauthentication(other),
                    }
                })?;
            self.inner
                .auth
                .update_password(&identity, new)
                .await
                .map_err(ProfileError::PasswordChange)?;
            info!(uid = %identity.uid, "password changed");
        }

        let mut fields = Map::new();
        if let Some(avatar) = update.avatar {
            let object_path = format!("avatars/{}/{}", identity.uid, avatar.file_name);
            self.inner
                .files
                .upload(&object_path, avatar.bytes)
                .await
                .map_err(ProfileError::AvatarUpload)?;
            let url = self
                .inner
                .files
                .public_url(&object_path)
                .await
                .map_err(ProfileError::AvatarUpload)?;
            fields.insert(FIELD_AVATAR_URL.to_string(), Value::String(url));
        }
        if let Some(display_name) = update.display_name {
            fields.insert(FIELD_DISPLAY_NAME.to_string(), Value::String(display_name));
        }
        if let Some(birthdate) = update.birthdate {
            fields.insert(
                FIELD_BIRTHDATE.to_string(),
                Value::String(format_birthdate(birthdate)),
            );
        }

        let path = profile_doc_path(&identity.uid);
        if !fields.is_empty() {
            self.inner
                .documents
                .update(&path, Value::Object(fields))
                .await
                .map_err(ProfileError::Storage)?;
        }

        let document = self
            .inner
            .documents
            .get(&path)
            .await
            .map_err(ProfileError::Storage)?;
        let profile = match document {
            Some(document) => decode_profile(&path, document)?,
            None => return Err(ProfileError::Storage(StorageError::not_found(path))),
        };
        self.inner.profile.send_replace(Some(profile.clone()));
        info!(uid = %identity.uid, "profile updated");
        Ok(profile)
    }
}

fn profile_fields(profile: &UserProfile) -> Value {
    let mut fields = Map::new();
    fields.insert(
        FIELD_DISPLAY_NAME.to_string(),
        Value::String(profile.display_name.clone()),
    );
    fields.insert(
        FIELD_BIRTHDATE.to_string(),
        Value::String(format_birthdate(profile.birthdate)),
    );
    fields.insert(
        FIELD_AVATAR_URL.to_string(),
        Value::String(profile.avatar_url.clone()),
    );
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_passwords_are_rejected() {
        let update = ProfileUpdate {
            old_password: Some("secret1".into()),
            new_password: Some("secret1".into()),
            ..ProfileUpdate::default()
        };
        assert!(matches!(update.check(), Err(ProfileError::Validation(_))));
    }

    #[test]
    fn lone_password_is_rejected() {
        let update = ProfileUpdate {
            new_password: Some("secret2".into()),
            ..ProfileUpdate::default()
        };
        assert!(matches!(update.check(), Err(ProfileError::Validation(_))));
    }

    #[test]
    fn short_new_password_and_long_name_fail_validation() {
        let update = ProfileUpdate {
            old_password: Some("secret1".into()),
            new_password: Some("abc".into()),
            ..ProfileUpdate::default()
        };
        assert!(matches!(update.check(), Err(ProfileError::Validation(_))));

        let update = ProfileUpdate {
            display_name: Some("x".repeat(65)),
            ..ProfileUpdate::default()
        };
        assert!(matches!(update.check(), Err(ProfileError::Validation(_))));
    }

    #[test]
    fn avatar_file_names_are_single_segments() {
        assert!(validate_file_name("me.png").is_ok());
        assert!(validate_file_name("../me.png").is_err());
        assert!(validate_file_name("").is_err());
    }
}
