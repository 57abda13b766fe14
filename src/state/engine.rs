use time::OffsetDateTime;

use crate::state::game::{Card, CardId, GameResult, GameState};

/// Turn phase derived from the selection slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// No card selected.
    Idle,
    /// One card face up, waiting for the second click.
    FirstSelected,
    /// Two cards selected, board locked until the comparison resolves.
    Matching,
}

/// Why a click left the state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A comparison is still resolving.
    BoardLocked,
    /// The card is the pending first selection.
    AlreadySelected,
    /// The card is already face up.
    AlreadyExposed,
    /// No card at that position.
    OutOfBounds,
}

/// Ties a scheduled callback to the board it was scheduled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionToken {
    /// Board generation at scheduling time.
    pub generation: u64,
    /// First card of the compared pair.
    pub first: CardId,
    /// Second card of the compared pair.
    pub second: CardId,
}

/// Result of applying one click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Pure no-op.
    Ignored(IgnoreReason),
    /// The card became the first selection.
    FirstSelected,
    /// Second card pairs with the first. `completes_board` is true when no
    /// hidden card remains.
    Matched {
        /// Whether this pair cleared the board.
        completes_board: bool,
        /// Token for the scheduled completion, if any.
        token: ResolutionToken,
    },
    /// Second card does not pair with the first.
    Mismatched {
        /// Token for the scheduled revert.
        token: ResolutionToken,
    },
}

/// Board owner applying every game transition synchronously.
///
/// The generation counter changes whenever the board is replaced so that
/// callbacks scheduled for an older board can be recognised and dropped.
#[derive(Debug, Clone, Default)]
pub struct GameEngine {
    state: GameState,
    generation: u64,
}

impl GameEngine {
    /// Engine holding the default, not yet loaded state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the current state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Current board generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Phase derived from the selection slots.
    pub fn phase(&self) -> TurnPhase {
        match (&self.state.first_card, &self.state.second_card) {
            (None, _) => TurnPhase::Idle,
            (Some(_), None) => TurnPhase::FirstSelected,
            (Some(_), Some(_)) => TurnPhase::Matching,
        }
    }

    /// Whether a fresh board must be dealt for `grid_size`. A finished board
    /// is always replaced.
    pub fn needs_deal(&self, grid_size: usize) -> bool {
        !(self.state.state_loaded
            && !self.state.cards.is_empty()
            && self.state.grid_size == grid_size
            && !self.state.is_complete())
    }

    /// Install a freshly shuffled board and reset the turn state.
    pub fn deal(&mut self, grid_size: usize, cards: Vec<Card>) {
        self.state.cards = cards;
        self.state.grid_size = grid_size;
        self.state.attempts = 0;
        self.state.lock_board = false;
        self.state.first_card = None;
        self.state.second_card = None;
        self.state.state_loaded = true;
        self.bump_generation();
    }

    /// Replace the whole state with one read from storage.
    ///
    /// A stored pair still awaiting its comparison has lost the task that would
    /// resolve it, so it is resolved here. Returns `true` when that changed the
    /// stored state.
    pub fn restore(&mut self, mut state: GameState) -> bool {
        state.state_loaded = true;
        self.state = state;
        self.bump_generation();
        self.resolve_pending_pair()
    }

    /// Reset to defaults and mark the state as not loaded.
    pub fn clear(&mut self) {
        self.state = GameState::default();
        self.bump_generation();
    }

    /// Replace the results history, e.g. after a remote refresh.
    pub fn set_results(&mut self, results: Vec<GameResult>) {
        self.state.results = results;
    }

    /// Apply a click on the card at `index`.
    pub fn handle_card_click(&mut self, index: usize) -> ClickOutcome {
        if self.state.lock_board {
            return ClickOutcome::Ignored(IgnoreReason::BoardLocked);
        }
        let Some(clicked) = self.state.cards.get(index) else {
            return ClickOutcome::Ignored(IgnoreReason::OutOfBounds);
        };
        if self
            .state
            .first_card
            .as_ref()
            .is_some_and(|first| first.id == clicked.id)
        {
            return ClickOutcome::Ignored(IgnoreReason::AlreadySelected);
        }
        if clicked.exposed {
            return ClickOutcome::Ignored(IgnoreReason::AlreadyExposed);
        }

        self.state.cards[index].exposed = true;
        let clicked = self.state.cards[index].clone();

        let Some(first) = self.state.first_card.clone() else {
            self.state.first_card = Some(clicked);
            return ClickOutcome::FirstSelected;
        };

        self.state.second_card = Some(clicked.clone());
        self.state.attempts += 1;
        self.state.lock_board = true;

        let token = ResolutionToken {
            generation: self.generation,
            first: first.id,
            second: clicked.id,
        };

        if first.pairs_with(&clicked) {
            ClickOutcome::Matched {
                completes_board: self.state.is_complete(),
                token,
            }
        } else {
            ClickOutcome::Mismatched { token }
        }
    }

    /// Release the board after a successful match; the pair stays face up.
    pub fn resolve_match(&mut self) {
        self.reset_selection();
    }

    /// Hide a mismatched pair and release the board.
    ///
    /// Returns `false` without touching anything when the token belongs to a
    /// replaced board.
    pub fn resolve_mismatch(&mut self, token: ResolutionToken) -> bool {
        if !self.token_is_current(&token) {
            return false;
        }

        for card in self
            .state
            .cards
            .iter_mut()
            .filter(|card| card.id == token.first || card.id == token.second)
        {
            card.exposed = false;
        }
        self.reset_selection();
        true
    }

    /// Clear both selection slots and unlock the board.
    pub fn reset_selection(&mut self) {
        self.state.first_card = None;
        self.state.second_card = None;
        self.state.lock_board = false;
    }

    /// Append a result computed from the current attempts and grid size.
    pub fn add_result(&mut self, now: OffsetDateTime) -> GameResult {
        let result = GameResult::new(now, self.state.attempts, self.state.grid_size);
        self.state.results.push(result.clone());
        result
    }

    /// Record the result of a completed board unless the board was replaced
    /// since `token` was issued.
    pub fn complete(&mut self, token: ResolutionToken, now: OffsetDateTime) -> Option<GameResult> {
        if !self.token_is_current(&token) || !self.state.is_complete() {
            return None;
        }
        Some(self.add_result(now))
    }

    fn resolve_pending_pair(&mut self) -> bool {
        if !self.state.lock_board && self.state.second_card.is_none() {
            return false;
        }
        if let (Some(first), Some(second)) = (&self.state.first_card, &self.state.second_card) {
            if !first.pairs_with(second) {
                let (first, second) = (first.id, second.id);
                for card in self
                    .state
                    .cards
                    .iter_mut()
                    .filter(|card| card.id == first || card.id == second)
                {
                    card.exposed = false;
                }
            }
        }
        self.reset_selection();
        true
    }

    fn token_is_current(&self, token: &ResolutionToken) -> bool {
        token.generation == self.generation
            && self.state.position_of(token.first).is_some()
            && self.state.position_of(token.second).is_some()
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck() -> Vec<Card> {
        vec![
            Card::new("A1", "A"),
            Card::new("A2", "A"),
            Card::new("B1", "B"),
            Card::new("B2", "B"),
        ]
    }

    fn dealt() -> GameEngine {
        let mut engine = GameEngine::new();
        engine.deal(4, deck());
        engine
    }

    #[test]
    fn initial_state_is_idle_and_not_loaded() {
        let engine = GameEngine::new();
        assert_eq!(engine.phase(), TurnPhase::Idle);
        assert!(!engine.state().state_loaded);
        assert!(engine.needs_deal(16));
    }

    #[test]
    fn deal_is_idempotent_for_same_grid_size() {
        let engine = dealt();
        assert!(!engine.needs_deal(4));
        assert!(engine.needs_deal(8));
    }

    #[test]
    fn first_click_selects_without_counting_attempt() {
        let mut engine = dealt();
        assert_eq!(engine.handle_card_click(0), ClickOutcome::FirstSelected);
        assert_eq!(engine.phase(), TurnPhase::FirstSelected);
        assert_eq!(engine.state().attempts, 0);
        assert!(!engine.state().lock_board);
        assert_eq!(
            engine.state().first_card.as_ref().map(|c| c.name.as_str()),
            Some("A1")
        );
    }

    #[test]
    fn matching_pair_locks_until_resolved() {
        let mut engine = dealt();
        engine.handle_card_click(0);
        let outcome = engine.handle_card_click(1);
        assert!(matches!(
            outcome,
            ClickOutcome::Matched {
                completes_board: false,
                ..
            }
        ));
        assert_eq!(engine.phase(), TurnPhase::Matching);
        assert!(engine.state().lock_board);
        assert_eq!(engine.state().attempts, 1);

        engine.resolve_match();
        assert_eq!(engine.phase(), TurnPhase::Idle);
        assert!(!engine.state().lock_board);
        assert!(engine.state().cards[0].exposed && engine.state().cards[1].exposed);
    }

    #[test]
    fn mismatch_reverts_both_cards() {
        let mut engine = dealt();
        engine.handle_card_click(0);
        let ClickOutcome::Mismatched { token } = engine.handle_card_click(2) else {
            panic!("expected mismatch");
        };
        assert!(engine.resolve_mismatch(token));

        let state = engine.state();
        assert!(!state.cards[0].exposed);
        assert!(!state.cards[2].exposed);
        assert!(state.first_card.is_none() && state.second_card.is_none());
        assert!(!state.lock_board);
        assert_eq!(state.attempts, 1);
    }

    #[test]
    fn ignored_clicks_leave_state_untouched() {
        let mut engine = dealt();
        engine.handle_card_click(0);
        let before = engine.state().clone();

        assert_eq!(
            engine.handle_card_click(0),
            ClickOutcome::Ignored(IgnoreReason::AlreadySelected)
        );
        assert_eq!(
            engine.handle_card_click(9),
            ClickOutcome::Ignored(IgnoreReason::OutOfBounds)
        );
        assert_eq!(engine.state(), &before);

        engine.handle_card_click(2);
        let locked = engine.state().clone();
        assert_eq!(
            engine.handle_card_click(3),
            ClickOutcome::Ignored(IgnoreReason::BoardLocked)
        );
        assert_eq!(engine.state(), &locked);
    }

    #[test]
    fn exposed_card_click_is_ignored() {
        let mut engine = dealt();
        engine.handle_card_click(0);
        engine.handle_card_click(1);
        engine.resolve_match();
        let before = engine.state().clone();

        assert_eq!(
            engine.handle_card_click(1),
            ClickOutcome::Ignored(IgnoreReason::AlreadyExposed)
        );
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn last_pair_reports_completion_and_records_result() {
        let mut engine = dealt();
        engine.handle_card_click(0);
        engine.handle_card_click(1);
        engine.resolve_match();
        engine.handle_card_click(2);
        let ClickOutcome::Matched {
            completes_board: true,
            token,
        } = engine.handle_card_click(3)
        else {
            panic!("expected completing match");
        };
        engine.resolve_match();

        let result = engine
            .complete(token, OffsetDateTime::now_utc())
            .expect("result recorded");
        assert_eq!(result.attempts, 2);
        assert_eq!(result.score, 6);
        assert_eq!(engine.state().results.len(), 1);
    }

    #[test]
    fn stale_tokens_are_ignored_after_redeal() {
        let mut engine = dealt();
        engine.handle_card_click(0);
        let ClickOutcome::Mismatched { token } = engine.handle_card_click(2) else {
            panic!("expected mismatch");
        };

        engine.deal(4, deck());
        let before = engine.state().clone();
        assert!(!engine.resolve_mismatch(token));
        assert!(engine.complete(token, OffsetDateTime::now_utc()).is_none());
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn restore_hides_a_pending_mismatch() {
        let mut engine = dealt();
        engine.handle_card_click(0);
        engine.handle_card_click(2);
        let saved = engine.state().clone();

        let mut restored = GameEngine::new();
        assert!(restored.restore(saved));
        let state = restored.state();
        assert!(!state.lock_board);
        assert!(state.first_card.is_none() && state.second_card.is_none());
        assert!(state.cards.iter().all(|card| !card.exposed));
        assert_eq!(state.attempts, 1);
        assert_eq!(restored.handle_card_click(3), ClickOutcome::FirstSelected);
    }

    #[test]
    fn restore_keeps_a_pending_match_face_up() {
        let mut engine = dealt();
        engine.handle_card_click(0);
        engine.handle_card_click(1);
        let saved = engine.state().clone();

        let mut restored = GameEngine::new();
        assert!(restored.restore(saved));
        let state = restored.state();
        assert!(!state.lock_board);
        assert!(state.cards[0].exposed && state.cards[1].exposed);
        assert_eq!(restored.phase(), TurnPhase::Idle);
    }

    #[test]
    fn restore_leaves_a_resting_state_alone() {
        let mut engine = dealt();
        engine.handle_card_click(0);
        let saved = engine.state().clone();

        let mut restored = GameEngine::new();
        assert!(!restored.restore(saved));
        assert_eq!(restored.phase(), TurnPhase::FirstSelected);
    }

    #[test]
    fn finished_board_needs_a_new_deal() {
        let mut engine = dealt();
        for (first, second) in [(0, 1), (2, 3)] {
            engine.handle_card_click(first);
            engine.handle_card_click(second);
            engine.resolve_match();
        }
        assert!(engine.state().is_complete());
        assert!(engine.needs_deal(4));
    }

    #[test]
    fn clear_resets_to_defaults() {
        let mut engine = dealt();
        let generation = engine.generation();
        engine.handle_card_click(0);
        engine.clear();
        assert_eq!(engine.state(), &GameState::default());
        assert!(engine.generation() > generation);
    }
}
