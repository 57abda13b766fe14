//! Library crate for memory-match, exposing the game core for the demo binary and integration tests.

pub mod config;
pub mod dao;
pub mod error;
pub mod providers;
pub mod services;
pub mod state;
