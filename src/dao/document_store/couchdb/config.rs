use std::env;

/// Database used when `COUCH_DB` is unset.
pub const DEFAULT_DATABASE: &str = "memory_match";

/// Connection settings of the CouchDB document store, read from `COUCH_*` variables.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Database holding the user documents.
    pub database: String,
    /// Basic-auth user.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL`, `COUCH_DB`, `COUCH_USERNAME` and `COUCH_PASSWORD`.
    /// Returns `None` when no base URL is configured.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let base_url = non_blank("COUCH_BASE_URL")?;
        let (username, password) = match (non_blank("COUCH_USERNAME"), lookup("COUCH_PASSWORD")) {
            (Some(user), Some(pass)) => (Some(user), Some(pass)),
            _ => (None, None),
        };
        Some(Self {
            base_url,
            database: non_blank("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            username,
            password,
        })
    }
}
