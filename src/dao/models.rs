//! Persisted document schemas and their validating decoders.
//!
//! Documents arriving from remote storage or local storage are decoded into
//! raw structs first and only become domain values after every field has been
//! range-checked.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::{Date, macros::format_description};

use crate::state::{
    game::{Card, GameResult, GameState, is_valid_grid_size, score_for},
    profile::UserProfile,
};

/// Field name of the profile display name.
pub const FIELD_DISPLAY_NAME: &str = "displayName";
/// Field name of the profile birthdate.
pub const FIELD_BIRTHDATE: &str = "birthdate";
/// Field name of the profile avatar address.
pub const FIELD_AVATAR_URL: &str = "avatarUrl";
/// Longest display name accepted in a profile document.
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// A stored document that does not match its schema.
#[derive(Debug, Error)]
pub enum MalformedDocumentError {
    /// The payload is not valid JSON or has wrongly typed fields.
    #[error("failed to decode document `{path}`")]
    Decode {
        /// Document location.
        path: String,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// A field is well typed but out of range or inconsistent.
    #[error("invalid field `{field}` in document `{path}`: {reason}")]
    Invalid {
        /// Document location.
        path: String,
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl MalformedDocumentError {
    fn invalid(path: &str, field: &'static str, reason: impl Into<String>) -> Self {
        MalformedDocumentError::Invalid {
            path: path.to_string(),
            field,
            reason: reason.into(),
        }
    }
}

/// Paths of the per-identity documents.
pub fn profile_doc_path(uid: &str) -> String {
    format!("users/{uid}")
}

/// Path of the game state document of `uid`.
pub fn game_state_doc_path(uid: &str) -> String {
    format!("users/{uid}/gameState/state")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGameState {
    first_card: Option<Card>,
    second_card: Option<Card>,
    lock_board: bool,
    attempts: u32,
    grid_size: usize,
    cards: Vec<Card>,
    #[serde(default)]
    results: Vec<GameResult>,
    #[serde(default)]
    state_loaded: bool,
}

/// Decode and validate a game state document.
pub fn decode_game_state(path: &str, value: Value) -> Result<GameState, MalformedDocumentError> {
    let raw: RawGameState =
        serde_json::from_value(value).map_err(|source| MalformedDocumentError::Decode {
            path: path.to_string(),
            source,
        })?;
    validate_game_state(path, raw)
}

/// Decode and validate a game state stored as a JSON string.
pub fn decode_game_state_str(path: &str, json: &str) -> Result<GameState, MalformedDocumentError> {
    let raw: RawGameState =
        serde_json::from_str(json).map_err(|source| MalformedDocumentError::Decode {
            path: path.to_string(),
            source,
        })?;
    validate_game_state(path, raw)
}

fn validate_game_state(path: &str, raw: RawGameState) -> Result<GameState, MalformedDocumentError> {
    if !is_valid_grid_size(raw.grid_size) {
        return Err(MalformedDocumentError::invalid(
            path,
            "gridSize",
            format!("{} is not an even size between 4 and 64", raw.grid_size),
        ));
    }

    if raw.cards.is_empty() {
        if raw.first_card.is_some() || raw.second_card.is_some() || raw.lock_board {
            return Err(MalformedDocumentError::invalid(
                path,
                "cards",
                "selection present without a board",
            ));
        }
    } else {
        validate_board(path, &raw)?;
    }

    validate_selection(path, &raw)?;
    validate_results(path, &raw.results)?;

    Ok(GameState {
        first_card: raw.first_card,
        second_card: raw.second_card,
        lock_board: raw.lock_board,
        attempts: raw.attempts,
        grid_size: raw.grid_size,
        cards: raw.cards,
        results: raw.results,
        state_loaded: raw.state_loaded,
    })
}

fn validate_board(path: &str, raw: &RawGameState) -> Result<(), MalformedDocumentError> {
    if raw.cards.len() != raw.grid_size {
        return Err(MalformedDocumentError::invalid(
            path,
            "cards",
            format!(
                "board holds {} cards, grid size is {}",
                raw.cards.len(),
                raw.grid_size
            ),
        ));
    }

    let mut ids = HashSet::with_capacity(raw.cards.len());
    let mut sets: HashMap<&str, usize> = HashMap::new();
    for card in &raw.cards {
        if !ids.insert(card.id) {
            return Err(MalformedDocumentError::invalid(
                path,
                "cards",
                format!("duplicate card id {}", card.id),
            ));
        }
        *sets.entry(card.set.as_str()).or_default() += 1;
    }

    if let Some((set, count)) = sets.iter().find(|(_, count)| **count != 2) {
        return Err(MalformedDocumentError::invalid(
            path,
            "cards",
            format!("set `{set}` appears {count} times"),
        ));
    }

    Ok(())
}

fn validate_selection(path: &str, raw: &RawGameState) -> Result<(), MalformedDocumentError> {
    if raw.second_card.is_some() && raw.first_card.is_none() {
        return Err(MalformedDocumentError::invalid(
            path,
            "secondCard",
            "second selection without a first one",
        ));
    }

    if raw.lock_board != raw.second_card.is_some() {
        return Err(MalformedDocumentError::invalid(
            path,
            "lockBoard",
            "board lock must match a pending pair",
        ));
    }

    let selected = [
        ("firstCard", raw.first_card.as_ref()),
        ("secondCard", raw.second_card.as_ref()),
    ];
    for (field, card) in selected {
        let Some(card) = card else { continue };
        let on_board = raw.cards.iter().find(|candidate| candidate.id == card.id);
        match on_board {
            Some(candidate) if candidate.exposed => {}
            Some(_) => {
                return Err(MalformedDocumentError::invalid(
                    path,
                    field,
                    "selected card is face down",
                ));
            }
            None => {
                return Err(MalformedDocumentError::invalid(
                    path,
                    field,
                    format!("card {} is not on the board", card.id),
                ));
            }
        }
    }

    Ok(())
}

fn validate_results(path: &str, results: &[GameResult]) -> Result<(), MalformedDocumentError> {
    for result in results {
        if !is_valid_grid_size(result.grid_size) {
            return Err(MalformedDocumentError::invalid(
                path,
                "results",
                format!("result grid size {} is invalid", result.grid_size),
            ));
        }
        if result.score != score_for(result.grid_size, result.attempts) {
            return Err(MalformedDocumentError::invalid(
                path,
                "results",
                format!(
                    "score {} does not match {} attempts on {} cards",
                    result.score, result.attempts, result.grid_size
                ),
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResults {
    #[serde(default)]
    results: Vec<GameResult>,
}

/// Decode only the result history of a game state document.
pub fn decode_results(path: &str, value: Value) -> Result<Vec<GameResult>, MalformedDocumentError> {
    let raw: RawResults =
        serde_json::from_value(value).map_err(|source| MalformedDocumentError::Decode {
            path: path.to_string(),
            source,
        })?;
    validate_results(path, &raw.results)?;
    Ok(raw.results)
}

/// Wire representation of a profile document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    /// Display name, possibly empty.
    #[serde(default)]
    pub display_name: String,
    /// `YYYY-MM-DD`.
    pub birthdate: String,
    /// Avatar address.
    pub avatar_url: String,
}

impl From<&UserProfile> for ProfileDocument {
    fn from(profile: &UserProfile) -> Self {
        Self {
            display_name: profile.display_name.clone(),
            birthdate: format_birthdate(profile.birthdate),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

/// Decode and validate a profile document.
pub fn decode_profile(path: &str, value: Value) -> Result<UserProfile, MalformedDocumentError> {
    let doc: ProfileDocument =
        serde_json::from_value(value).map_err(|source| MalformedDocumentError::Decode {
            path: path.to_string(),
            source,
        })?;

    if doc.display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(MalformedDocumentError::invalid(
            path,
            FIELD_DISPLAY_NAME,
            format!("longer than {MAX_DISPLAY_NAME_LEN} characters"),
        ));
    }
    if doc.avatar_url.trim().is_empty() {
        return Err(MalformedDocumentError::invalid(
            path,
            FIELD_AVATAR_URL,
            "must not be empty",
        ));
    }
    let birthdate = parse_birthdate(&doc.birthdate).ok_or_else(|| {
        MalformedDocumentError::invalid(
            path,
            FIELD_BIRTHDATE,
            format!("`{}` is not a YYYY-MM-DD date", doc.birthdate),
        )
    })?;

    Ok(UserProfile {
        display_name: doc.display_name,
        birthdate,
        avatar_url: doc.avatar_url,
    })
}

/// Render a birthdate the way profile documents store it.
pub fn format_birthdate(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Parse a `YYYY-MM-DD` birthdate.
pub fn parse_birthdate(value: &str) -> Option<Date> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;

    const PATH: &str = "users/u1/gameState/state";

    fn dealt_state() -> GameState {
        GameState {
            cards: vec![
                Card::new("A1", "A"),
                Card::new("A2", "A"),
                Card::new("B1", "B"),
                Card::new("B2", "B"),
            ],
            grid_size: 4,
            state_loaded: true,
            ..GameState::default()
        }
    }

    #[test]
    fn valid_state_round_trips() {
        let mut state = dealt_state();
        state.cards[0].exposed = true;
        state.first_card = Some(state.cards[0].clone());
        state.results.push(GameResult::new(OffsetDateTime::now_utc(), 3, 4));

        let value = serde_json::to_value(&state).unwrap();
        let decoded = decode_game_state(PATH, value).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn wrong_types_fail_to_decode() {
        let err = decode_game_state(PATH, json!({"gridSize": "big"})).unwrap_err();
        assert!(matches!(err, MalformedDocumentError::Decode { .. }));
    }

    #[test]
    fn board_size_must_match_grid_size() {
        let mut state = dealt_state();
        state.grid_size = 6;
        let err = decode_game_state(PATH, serde_json::to_value(&state).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            MalformedDocumentError::Invalid { field: "cards", .. }
        ));
    }

    #[test]
    fn every_set_must_appear_twice() {
        let mut state = dealt_state();
        state.cards[3].set = "C".into();
        let err = decode_game_state(PATH, serde_json::to_value(&state).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            MalformedDocumentError::Invalid { field: "cards", .. }
        ));
    }

    #[test]
    fn lock_without_pending_pair_is_rejected() {
        let mut state = dealt_state();
        state.lock_board = true;
        let err = decode_game_state(PATH, serde_json::to_value(&state).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            MalformedDocumentError::Invalid {
                field: "lockBoard",
                ..
            }
        ));
    }

    #[test]
    fn selection_must_reference_board_cards() {
        let mut state = dealt_state();
        let mut stranger = Card::new("Z", "Z");
        stranger.exposed = true;
        state.first_card = Some(stranger);
        let err = decode_game_state(PATH, serde_json::to_value(&state).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            MalformedDocumentError::Invalid {
                field: "firstCard",
                ..
            }
        ));
    }

    #[test]
    fn tampered_score_is_rejected() {
        let mut state = dealt_state();
        let mut result = GameResult::new(OffsetDateTime::now_utc(), 2, 4);
        result.score = 99;
        state.results.push(result);
        let err = decode_game_state(PATH, serde_json::to_value(&state).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            MalformedDocumentError::Invalid {
                field: "results",
                ..
            }
        ));
    }

    #[test]
    fn profile_document_decodes_birthdate() {
        let profile = decode_profile(
            "users/u1",
            json!({"displayName": "Ada", "birthdate": "1990-12-10", "avatarUrl": "a.png"}),
        )
        .unwrap();
        assert_eq!(profile.display_name, "Ada");
        assert_eq!(format_birthdate(profile.birthdate), "1990-12-10");
    }

    #[test]
    fn profile_with_bad_birthdate_is_rejected() {
        let err = decode_profile(
            "users/u1",
            json!({"displayName": "", "birthdate": "10/12/1990", "avatarUrl": "a.png"}),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MalformedDocumentError::Invalid {
                field: FIELD_BIRTHDATE,
                ..
            }
        ));
    }
}
