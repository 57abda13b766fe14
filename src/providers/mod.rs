/// Authentication provider seam and its in-memory implementation.
pub mod auth;
/// Deck provider seam and the catalog-backed deck builder.
pub mod deck;

pub use auth::{AuthProvider, MemoryAuthProvider};
pub use deck::{CardCatalog, CardSet, CatalogDeckProvider, DeckProvider, StaticCardCatalog};
