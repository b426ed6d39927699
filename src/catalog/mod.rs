//! Card catalogs
//!
//! One catalog file per card set, published as JSON with a list of sub-sets
//! ("Sets"), each holding its cards in checklist order.

pub mod cache;
pub mod fetch;

pub use cache::CatalogCache;
pub use fetch::{AssetFetcher, HttpAssetFetcher, LocalAssetFetcher};

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LoadError;

/// Attribute tag marking a rookie card
pub const ROOKIE_ATTRIBUTE: &str = "RC";

/// Identifies one catalog: release year plus set name.
///
/// Detector labels use the same `"{year}|{set name}"` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetKey {
    pub year: String,
    pub set_name: String,
}

impl SetKey {
    pub fn new(year: impl Into<String>, set_name: impl Into<String>) -> Self {
        Self {
            year: year.into(),
            set_name: set_name.into(),
        }
    }

    /// Catalog file name, spaces in the set name become dashes
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.year, self.set_name.replace(' ', "-"))
    }
}

impl fmt::Display for SetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.year, self.set_name)
    }
}

impl FromStr for SetKey {
    type Err = LoadError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let (year, set_name) = label
            .split_once('|')
            .ok_or_else(|| LoadError::InvalidSetKey(label.to_string()))?;

        let year = year.trim();
        let set_name = set_name.trim();
        if year.is_empty() || set_name.is_empty() {
            return Err(LoadError::InvalidSetKey(label.to_string()));
        }

        Ok(Self::new(year, set_name))
    }
}

/// Location of a set's catalog under `base_url`:
/// `{base_url}/{year}/{year}-{set-name}.json`.
///
/// HTTP(S) bases get each path segment percent-encoded; anything else is
/// treated as a local directory and joined as-is.
pub fn catalog_url(base_url: &str, key: &SetKey) -> String {
    let base = base_url.trim_end_matches('/');

    if let Ok(mut url) = reqwest::Url::parse(base) {
        if matches!(url.scheme(), "http" | "https") {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(&key.year).push(&key.file_name());
            }
            return url.to_string();
        }
    }

    format!("{}/{}/{}", base, key.year, key.file_name())
}

/// A single card in a checklist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Card {
    #[serde(alias = "number", deserialize_with = "card_number")]
    pub number: String,
    #[serde(alias = "name")]
    pub name: String,
    #[serde(alias = "attributes", default)]
    pub attributes: Option<Vec<String>>,
}

impl Card {
    pub fn is_rookie(&self) -> bool {
        self.attributes
            .as_ref()
            .is_some_and(|attrs| attrs.iter().any(|a| a == ROOKIE_ATTRIBUTE))
    }
}

/// A sub-set of a release (base set, traded, inserts, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CardSet {
    #[serde(alias = "name", default)]
    pub name: String,
    #[serde(alias = "cards", default)]
    pub cards: Vec<Card>,
}

/// Full catalog for one [`SetKey`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetCatalog {
    #[serde(alias = "sets")]
    pub sets: Vec<CardSet>,
}

impl SetCatalog {
    /// Parse catalog JSON as published by the data source
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// All cards in catalog order (sub-set order, then checklist order)
    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.sets.iter().flat_map(|set| set.cards.iter())
    }

    pub fn card_count(&self) -> usize {
        self.sets.iter().map(|set| set.cards.len()).sum()
    }
}

/// Card numbers show up both as strings ("123", "T45") and as plain integers
fn card_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Text(String),
        Int(i64),
    }

    Ok(match Number::deserialize(deserializer)? {
        Number::Text(s) => s,
        Number::Int(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Year": 1989,
        "Name": "Upper Deck",
        "Sets": [
            {
                "Name": "Base",
                "Cards": [
                    { "Number": "1", "Name": "Ken Griffey Jr.", "Attributes": ["RC"] },
                    { "Number": 2, "Name": "Luis Medina" }
                ]
            },
            {
                "Name": "Update",
                "Cards": [
                    { "Number": "701U", "Name": "Mike Schmidt", "Attributes": null }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = SetCatalog::from_json(SAMPLE.as_bytes()).unwrap();

        assert_eq!(catalog.sets.len(), 2);
        assert_eq!(catalog.card_count(), 3);

        let names: Vec<&str> = catalog.cards().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Ken Griffey Jr.", "Luis Medina", "Mike Schmidt"]);

        let griffey = &catalog.sets[0].cards[0];
        assert!(griffey.is_rookie());
        assert_eq!(catalog.sets[0].cards[1].number, "2");
        assert!(!catalog.sets[1].cards[0].is_rookie());
    }

    #[test]
    fn test_parse_lowercase_fields() {
        let json = r#"{"sets":[{"name":"Base","cards":[{"number":7,"name":"Mike Trout"}]}]}"#;
        let catalog = SetCatalog::from_json(json.as_bytes()).unwrap();
        assert_eq!(catalog.sets[0].cards[0].number, "7");
        assert_eq!(catalog.sets[0].cards[0].name, "Mike Trout");
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(SetCatalog::from_json(b"{ not json").is_err());
        assert!(SetCatalog::from_json(br#"{"Sets": 5}"#).is_err());
    }

    #[test]
    fn test_set_key_roundtrip() {
        let key: SetKey = "2022|Topps-Chrome".parse().unwrap();
        assert_eq!(key.year, "2022");
        assert_eq!(key.set_name, "Topps-Chrome");
        assert_eq!(key.to_string(), "2022|Topps-Chrome");
    }

    #[test]
    fn test_set_key_rejects_bad_labels() {
        assert!("1989".parse::<SetKey>().is_err());
        assert!("|Topps".parse::<SetKey>().is_err());
        assert!("1989| ".parse::<SetKey>().is_err());
    }

    #[test]
    fn test_catalog_url_http() {
        let key = SetKey::new("1989", "Upper Deck");
        assert_eq!(
            catalog_url("https://example.test/cards/", &key),
            "https://example.test/cards/1989/1989-Upper-Deck.json"
        );
    }

    #[test]
    fn test_catalog_url_encodes_segment() {
        let key = SetKey::new("1991", "Fleer Ultra #1");
        assert_eq!(
            catalog_url("https://example.test/cards", &key),
            "https://example.test/cards/1991/1991-Fleer-Ultra-%231.json"
        );
    }

    #[test]
    fn test_catalog_url_local_dir() {
        let key = SetKey::new("1987", "Topps");
        assert_eq!(catalog_url("/data/cards", &key), "/data/cards/1987/1987-Topps.json");
    }
}
