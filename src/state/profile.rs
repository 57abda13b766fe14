use time::{Date, OffsetDateTime};

/// Per-identity profile shown in the account screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Name shown to other players; empty until the user sets one.
    pub display_name: String,
    /// Birthdate, defaults to the day the profile was created.
    pub birthdate: Date,
    /// Public address of the avatar image.
    pub avatar_url: String,
}

impl UserProfile {
    /// Profile created lazily on first access.
    pub fn with_defaults(default_avatar_url: impl Into<String>) -> Self {
        Self {
            display_name: String::new(),
            birthdate: OffsetDateTime::now_utc().date(),
            avatar_url: default_avatar_url.into(),
        }
    }
}
