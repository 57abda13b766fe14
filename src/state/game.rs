use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Grid size used until the player picks another one.
pub const DEFAULT_GRID_SIZE: usize = 16;
/// Smallest playable board (two pairs).
pub const MIN_GRID_SIZE: usize = 4;
/// Largest board accepted from players or storage.
pub const MAX_GRID_SIZE: usize = 64;

/// Identity of one card instance on a board.
///
/// Both cards of a pair share `name` and `set`, so clicks are always resolved
/// against this id rather than the card's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(Uuid);

impl CardId {
    /// Allocate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Instance identity, unique per board.
    pub id: CardId,
    /// Face label shown to the player.
    pub name: String,
    /// Pair key: two cards with the same set match.
    pub set: String,
    /// Whether the card is currently face up.
    pub exposed: bool,
}

impl Card {
    /// Create a hidden card with a fresh identity.
    pub fn new(name: impl Into<String>, set: impl Into<String>) -> Self {
        Self {
            id: CardId::new(),
            name: name.into(),
            set: set.into(),
            exposed: false,
        }
    }

    /// Whether `other` completes a pair with this card.
    pub fn pairs_with(&self, other: &Card) -> bool {
        self.id != other.id && self.set == other.set
    }
}

/// Outcome of one finished game, appended to the history and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    /// Moment the board was completed.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Number of pair comparisons needed.
    pub attempts: u32,
    /// Board size the game was played on.
    pub grid_size: usize,
    /// `max(0, grid_size * 2 - attempts)`.
    pub score: u32,
}

impl GameResult {
    /// Build a result stamped with `date`, computing the score.
    pub fn new(date: OffsetDateTime, attempts: u32, grid_size: usize) -> Self {
        Self {
            date,
            attempts,
            grid_size,
            score: score_for(grid_size, attempts),
        }
    }
}

/// Score formula shared by the engine and the document validator.
pub fn score_for(grid_size: usize, attempts: u32) -> u32 {
    let budget = u32::try_from(grid_size.saturating_mul(2)).unwrap_or(u32::MAX);
    budget.saturating_sub(attempts)
}

/// Whether `grid_size` can be dealt.
pub fn is_valid_grid_size(grid_size: usize) -> bool {
    grid_size % 2 == 0 && (MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&grid_size)
}

/// Complete game state as persisted locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// First card of the pending pair, if any.
    pub first_card: Option<Card>,
    /// Second card of the pending pair, set only while the board is locked.
    pub second_card: Option<Card>,
    /// Rejects clicks while a pair comparison resolves.
    pub lock_board: bool,
    /// Completed pair comparisons on the current board.
    pub attempts: u32,
    /// Total number of cards on the board.
    pub grid_size: usize,
    /// The board.
    pub cards: Vec<Card>,
    /// Append-only score history.
    pub results: Vec<GameResult>,
    /// Whether the state was loaded from storage or freshly dealt.
    pub state_loaded: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            first_card: None,
            second_card: None,
            lock_board: false,
            attempts: 0,
            grid_size: DEFAULT_GRID_SIZE,
            cards: Vec::new(),
            results: Vec::new(),
            state_loaded: false,
        }
    }
}

impl GameState {
    /// Position of the card with `id` on the board.
    pub fn position_of(&self, id: CardId) -> Option<usize> {
        self.cards.iter().position(|card| card.id == id)
    }

    /// Whether every card on a non-empty board is face up.
    pub fn is_complete(&self) -> bool {
        !self.cards.is_empty() && self.cards.iter().all(|card| card.exposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_never_goes_negative() {
        assert_eq!(score_for(4, 1), 7);
        assert_eq!(score_for(16, 32), 0);
        assert_eq!(score_for(4, 100), 0);
    }

    #[test]
    fn grid_size_must_be_even_and_bounded() {
        assert!(is_valid_grid_size(4));
        assert!(is_valid_grid_size(16));
        assert!(!is_valid_grid_size(2));
        assert!(!is_valid_grid_size(15));
        assert!(!is_valid_grid_size(66));
    }

    #[test]
    fn cards_with_same_face_are_distinct_instances() {
        let a = Card::new("A", "A");
        let b = Card::new("A", "A");
        assert_ne!(a, b);
        assert!(a.pairs_with(&b));
        assert!(!a.pairs_with(&a));
    }

    #[test]
    fn state_serializes_with_camel_case_keys() {
        let value = serde_json::to_value(GameState::default()).unwrap();
        assert!(value.get("lockBoard").is_some());
        assert!(value.get("gridSize").is_some());
        assert!(value.get("stateLoaded").is_some());
        assert_eq!(value["firstCard"], serde_json::Value::Null);
    }
}
