//! Merch catalog
//!
//! Read-only lookup table of purchasable items, injected into the ledger
//! engine and the history aggregator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use super::Amount;

/// A purchasable item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub key: String,
    pub price: Amount,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate catalog key: {0}")]
    DuplicateKey(String),

    #[error("Duplicate catalog id: {0}")]
    DuplicateId(i64),

    #[error("Catalog key must not be empty (id {0})")]
    EmptyKey(i64),

    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Default merch table: (id, key, price)
const MERCH: &[(i64, &str, i64)] = &[
    (1, "t-shirt", 80),
    (2, "cup", 20),
    (3, "book", 50),
    (4, "pen", 10),
    (5, "powerbank", 200),
    (6, "hoody", 300),
    (7, "umbrella", 200),
    (8, "socks", 10),
    (9, "wallet", 50),
    (10, "pink-hoody", 500),
];

/// Immutable catalog indexed by key and by id
#[derive(Debug, Clone)]
pub struct Catalog {
    by_key: HashMap<String, CatalogItem>,
    names_by_id: HashMap<i64, String>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate keys or ids
    pub fn new(items: Vec<CatalogItem>) -> Result<Self, CatalogError> {
        let mut by_key = HashMap::with_capacity(items.len());
        let mut names_by_id = HashMap::with_capacity(items.len());

        for item in items {
            if item.key.trim().is_empty() {
                return Err(CatalogError::EmptyKey(item.id));
            }
            if names_by_id.insert(item.id, item.key.clone()).is_some() {
                return Err(CatalogError::DuplicateId(item.id));
            }
            if by_key.contains_key(&item.key) {
                return Err(CatalogError::DuplicateKey(item.key));
            }
            by_key.insert(item.key.clone(), item);
        }

        Ok(Self { by_key, names_by_id })
    }

    /// The shop's standard merch table
    pub fn merch() -> Self {
        let mut by_key = HashMap::with_capacity(MERCH.len());
        let mut names_by_id = HashMap::with_capacity(MERCH.len());

        for &(id, key, price) in MERCH {
            // Prices in MERCH are all positive literals
            let Ok(price) = Amount::new(price) else {
                continue;
            };
            names_by_id.insert(id, key.to_string());
            by_key.insert(
                key.to_string(),
                CatalogItem {
                    id,
                    key: key.to_string(),
                    price,
                },
            );
        }

        Self { by_key, names_by_id }
    }

    /// Load a JSON array of `{id, key, price}` objects
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let items: Vec<CatalogItem> = serde_json::from_str(&raw)?;
        Self::new(items)
    }

    pub fn get(&self, key: &str) -> Option<&CatalogItem> {
        self.by_key.get(key)
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.names_by_id.get(&id).map(String::as_str)
    }

    /// Display name for a catalog id; ids no longer in the catalog render as `item_<id>`
    pub fn display_name(&self, id: i64) -> String {
        match self.name_of(id) {
            Some(name) => name.to_string(),
            None => format!("item_{id}"),
        }
    }

    /// Items ordered by id
    pub fn items(&self) -> Vec<&CatalogItem> {
        let mut items: Vec<_> = self.by_key.values().collect();
        items.sort_by_key(|item| item.id);
        items
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::merch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, key: &str, price: i64) -> CatalogItem {
        CatalogItem {
            id,
            key: key.to_string(),
            price: Amount::new(price).unwrap(),
        }
    }

    #[test]
    fn test_merch_table() {
        let catalog = Catalog::merch();
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog.get("t-shirt").unwrap().price.value(), 80);
        assert_eq!(catalog.get("pink-hoody").unwrap().id, 10);
        assert!(catalog.get("yacht").is_none());
    }

    #[test]
    fn test_display_name_fallback() {
        let catalog = Catalog::merch();
        assert_eq!(catalog.display_name(2), "cup");
        assert_eq!(catalog.display_name(42), "item_42");
    }

    #[test]
    fn test_items_sorted_by_id() {
        let ids: Vec<i64> = Catalog::merch().items().iter().map(|i| i.id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = Catalog::new(vec![item(1, "cup", 20), item(1, "pen", 10)]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(1)));

        let err = Catalog::new(vec![item(1, "cup", 20), item(2, "cup", 10)]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateKey(ref k) if k == "cup"));

        let err = Catalog::new(vec![item(3, " ", 20)]).unwrap_err();
        assert!(matches!(err, CatalogError::EmptyKey(3)));
    }

    #[test]
    fn test_parse_rejects_non_positive_price() {
        let parsed: Result<Vec<CatalogItem>, _> =
            serde_json::from_str(r#"[{"id": 1, "key": "free", "price": 0}]"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("catalog-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"[{"id": 7, "key": "sticker", "price": 5}]"#).unwrap();

        let catalog = Catalog::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("sticker").unwrap().price.value(), 5);
        assert_eq!(catalog.display_name(7), "sticker");
    }
}
