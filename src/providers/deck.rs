use std::sync::Arc;

use futures::future::BoxFuture;
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::DeckError,
    state::game::{Card, is_valid_grid_size},
};

/// Source of freshly shuffled boards.
pub trait DeckProvider: Send + Sync {
    /// Produce `grid_size` hidden cards forming `grid_size / 2` pairs, shuffled.
    fn initialize_cards(&self, grid_size: usize) -> BoxFuture<'static, Result<Vec<Card>, DeckError>>;
}

/// One catalog entry: a pair key with optional distinct faces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSet {
    /// Pair key.
    pub set: String,
    /// Face of the first card; the set name when absent.
    #[serde(default)]
    pub card1: Option<String>,
    /// Face of the second card; the set name when absent.
    #[serde(default)]
    pub card2: Option<String>,
}

impl CardSet {
    /// Entry whose two cards both show the set name.
    pub fn plain(set: impl Into<String>) -> Self {
        Self {
            set: set.into(),
            card1: None,
            card2: None,
        }
    }

    fn faces(&self) -> (&str, &str) {
        match (self.card1.as_deref(), self.card2.as_deref()) {
            (Some(first), Some(second)) if !first.is_empty() && !second.is_empty() => {
                (first, second)
            }
            _ => (self.set.as_str(), self.set.as_str()),
        }
    }
}

/// Catalog of card sets boards are drawn from.
pub trait CardCatalog: Send + Sync {
    /// Fetch every available set.
    fn card_sets(&self) -> BoxFuture<'static, Result<Vec<CardSet>, DeckError>>;
}

/// Catalog serving a fixed list of sets.
#[derive(Debug, Clone)]
pub struct StaticCardCatalog {
    sets: Arc<Vec<CardSet>>,
}

impl StaticCardCatalog {
    /// Serve `sets` unchanged on every fetch.
    pub fn new(sets: Vec<CardSet>) -> Self {
        Self {
            sets: Arc::new(sets),
        }
    }

    /// Catalog of `count` plain sets named `set-1`, `set-2`, ...
    pub fn numbered(count: usize) -> Self {
        Self::new(
            (1..=count)
                .map(|index| CardSet::plain(format!("set-{index}")))
                .collect(),
        )
    }
}

impl CardCatalog for StaticCardCatalog {
    fn card_sets(&self) -> BoxFuture<'static, Result<Vec<CardSet>, DeckError>> {
        let sets = self.sets.clone();
        Box::pin(async move { Ok(sets.as_ref().clone()) })
    }
}

/// Catalog fetched as a JSON array from an HTTP endpoint.
#[cfg(feature = "http-deck")]
#[derive(Clone)]
pub struct HttpCardCatalog {
    client: reqwest::Client,
    url: Arc<str>,
}

#[cfg(feature = "http-deck")]
impl HttpCardCatalog {
    /// Fetch the catalog from `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            client: reqwest::Client::new(),
            url: Arc::from(url),
        }
    }
}

#[cfg(feature = "http-deck")]
impl CardCatalog for HttpCardCatalog {
    fn card_sets(&self) -> BoxFuture<'static, Result<Vec<CardSet>, DeckError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            let response = client
                .get(url.as_ref())
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|err| DeckError::Fetch {
                    source: Box::new(err),
                })?;
            let sets = response
                .json::<Vec<CardSet>>()
                .await
                .map_err(|err| DeckError::Fetch {
                    source: Box::new(err),
                })?;
            debug!(url = %url, sets = sets.len(), "fetched card catalog");
            Ok(sets)
        })
    }
}

/// Deck provider drawing pairs from a [`CardCatalog`].
#[derive(Clone)]
pub struct CatalogDeckProvider<C> {
    catalog: C,
}

impl<C: CardCatalog> CatalogDeckProvider<C> {
    /// Build decks from `catalog`.
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }
}

impl<C: CardCatalog> DeckProvider for CatalogDeckProvider<C> {
    fn initialize_cards(&self, grid_size: usize) -> BoxFuture<'static, Result<Vec<Card>, DeckError>> {
        let sets = self.catalog.card_sets();
        Box::pin(async move {
            let sets = sets.await?;
            build_deck(sets, grid_size, &mut rand::rng())
        })
    }
}

/// Draw `grid_size / 2` random sets, two cards each, and shuffle the board.
pub fn build_deck<R: Rng + ?Sized>(
    mut sets: Vec<CardSet>,
    grid_size: usize,
    rng: &mut R,
) -> Result<Vec<Card>, DeckError> {
    if !is_valid_grid_size(grid_size) {
        return Err(DeckError::InvalidGridSize(grid_size));
    }
    let required = grid_size / 2;
    if sets.len() < required {
        return Err(DeckError::CatalogTooSmall {
            required,
            available: sets.len(),
        });
    }

    sets.shuffle(rng);
    let mut cards = sets
        .iter()
        .take(required)
        .flat_map(|set| {
            let (first, second) = set.faces();
            [Card::new(first, &set.set), Card::new(second, &set.set)]
        })
        .collect::<Vec<_>>();
    cards.shuffle(rng);
    Ok(cards)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn deck_holds_exactly_two_cards_per_set() {
        let mut rng = StdRng::seed_from_u64(7);
        let sets = (1..=20).map(|i| CardSet::plain(format!("s{i}"))).collect();
        let cards = build_deck(sets, 16, &mut rng).unwrap();

        assert_eq!(cards.len(), 16);
        let mut per_set: HashMap<&str, usize> = HashMap::new();
        for card in &cards {
            *per_set.entry(card.set.as_str()).or_default() += 1;
            assert!(!card.exposed);
        }
        assert_eq!(per_set.len(), 8);
        assert!(per_set.values().all(|count| *count == 2));

        let ids = cards.iter().map(|card| card.id).collect::<HashSet<_>>();
        assert_eq!(ids.len(), 16);
    }

    #[test]
    fn distinct_faces_are_used_when_both_present() {
        let mut rng = StdRng::seed_from_u64(1);
        let sets = vec![
            CardSet {
                set: "fruit".into(),
                card1: Some("apple".into()),
                card2: Some("pear".into()),
            },
            CardSet {
                set: "half".into(),
                card1: Some("only-one".into()),
                card2: None,
            },
        ];
        let cards = build_deck(sets, 4, &mut rng).unwrap();

        let fruit = cards
            .iter()
            .filter(|card| card.set == "fruit")
            .map(|card| card.name.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(fruit, HashSet::from(["apple", "pear"]));
        assert!(
            cards
                .iter()
                .filter(|card| card.set == "half")
                .all(|card| card.name == "half")
        );
    }

    #[test]
    fn rejects_small_catalogs_and_bad_sizes() {
        let mut rng = StdRng::seed_from_u64(3);
        let sets = vec![CardSet::plain("a"), CardSet::plain("b")];
        assert!(matches!(
            build_deck(sets.clone(), 6, &mut rng),
            Err(DeckError::CatalogTooSmall {
                required: 3,
                available: 2
            })
        ));
        assert!(matches!(
            build_deck(sets, 5, &mut rng),
            Err(DeckError::InvalidGridSize(5))
        ));
    }

    #[tokio::test]
    async fn catalog_provider_deals_requested_size() {
        let provider = CatalogDeckProvider::new(StaticCardCatalog::numbered(10));
        let cards = provider.initialize_cards(8).await.unwrap();
        assert_eq!(cards.len(), 8);
    }
}
