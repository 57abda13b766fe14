/// Game orchestration: deck fetch, scheduled resolutions, persistence.
pub mod game_service;
/// User-facing notification fan-out.
pub mod notifications;
/// Identity-conditional game state storage and the ordered save queue.
pub mod persistence;
/// Profile loading, live synchronization and updates.
pub mod profile_service;
/// Session ownership and authentication reconciliation.
pub mod session_service;
