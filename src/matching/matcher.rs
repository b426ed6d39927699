//! Fuzzy lookup of a player name in a set catalog

use std::sync::Arc;
use tracing::{debug, warn};

use super::normalize::cleanup_string;
use super::MatchResult;
use crate::catalog::{Card, CatalogCache, SetCatalog, SetKey};

/// Searches set catalogs for OCR'd player names
#[derive(Clone)]
pub struct CardMatcher {
    cache: Arc<CatalogCache>,
}

impl CardMatcher {
    pub fn new(cache: Arc<CatalogCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<CatalogCache> {
        &self.cache
    }

    /// Resolve a raw OCR line against the catalog for `key`.
    ///
    /// Never fails: load errors and unmatchable text both yield
    /// [`MatchResult::None`].
    pub async fn search(&self, key: &SetKey, raw_candidate: &str) -> MatchResult {
        let candidate = cleanup_string(raw_candidate);

        // A lone token is OCR noise more often than a player name
        if !candidate.trim().contains(char::is_whitespace) {
            return MatchResult::None;
        }

        let catalog = match self.cache.ensure_loaded(key).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("No catalog for {}: {}", key, e);
                return MatchResult::None;
            }
        };

        let result = search_catalog(&catalog, &candidate);
        debug!("'{}' -> {:?} ({:.3})", candidate, result.kind(), result.score());
        result
    }
}

/// Match an already-normalized candidate against a loaded catalog
pub fn search_catalog(catalog: &SetCatalog, candidate: &str) -> MatchResult {
    let wanted = candidate.to_lowercase();

    if let Some(card) = catalog.cards().find(|c| c.name.to_lowercase() == wanted) {
        return MatchResult::Exact {
            card: card.clone(),
            extracted_text: candidate.to_string(),
        };
    }

    let mut best: Option<(f32, &Card)> = None;
    for card in catalog.cards() {
        let score = calculate_score(candidate, &card.name);
        if score <= 0.0 {
            continue;
        }
        // strictly greater keeps the earliest card on ties
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, card));
        }
    }

    match best {
        Some((score, card)) => MatchResult::Partial {
            card: card.clone(),
            extracted_text: candidate.to_string(),
            score,
        },
        None => MatchResult::None,
    }
}

/// Positional character agreement between two strings.
///
/// Both strings are lowercased and trimmed; the score is the number of
/// indices `i < len(shorter)` where both strings hold the same character,
/// divided by `len(longer)`. No alignment is attempted, so a shifted first
/// character ruins the score.
pub fn calculate_score(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    let matches = shorter
        .iter()
        .zip(longer.iter())
        .filter(|(x, y)| x == y)
        .count();

    matches as f32 / longer.len() as f32
}
