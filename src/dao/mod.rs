/// Per-identity document storage (remote backend).
pub mod document_store;
/// Per-identity binary file storage (avatars).
pub mod file_store;
/// On-device key/value storage used without an identity.
pub mod local_storage;
/// Persisted document schemas and validation.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
