//! Resolving OCR text to catalog cards

pub mod matcher;
pub mod normalize;

pub use matcher::{calculate_score, CardMatcher};
pub use normalize::cleanup_string;

use serde::Serialize;

use crate::catalog::Card;

/// Kind of match without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    None,
    Exact,
    Partial,
}

/// Outcome of searching one candidate string in one catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum MatchResult {
    #[default]
    None,
    /// Case-insensitive equality with a card name
    Exact { card: Card, extracted_text: String },
    /// Best positional similarity above zero
    Partial {
        card: Card,
        extracted_text: String,
        score: f32,
    },
}

impl MatchResult {
    pub fn kind(&self) -> MatchKind {
        match self {
            MatchResult::None => MatchKind::None,
            MatchResult::Exact { .. } => MatchKind::Exact,
            MatchResult::Partial { .. } => MatchKind::Partial,
        }
    }

    pub fn card(&self) -> Option<&Card> {
        match self {
            MatchResult::None => None,
            MatchResult::Exact { card, .. } | MatchResult::Partial { card, .. } => Some(card),
        }
    }

    /// Normalized text that produced the match
    pub fn extracted_text(&self) -> Option<&str> {
        match self {
            MatchResult::None => None,
            MatchResult::Exact { extracted_text, .. } | MatchResult::Partial { extracted_text, .. } => {
                Some(extracted_text)
            }
        }
    }

    /// 1.0 for exact matches, 0.0 when nothing matched
    pub fn score(&self) -> f32 {
        match self {
            MatchResult::None => 0.0,
            MatchResult::Exact { .. } => 1.0,
            MatchResult::Partial { score, .. } => *score,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, MatchResult::Exact { .. })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, MatchResult::None)
    }
}
