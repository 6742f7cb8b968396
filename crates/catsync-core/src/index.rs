//! Run-scoped lookup over the catalog: category name → identity and
//! product code → stored fields.
//!
//! The index is built once from a [`CatalogSnapshot`] and then updated in
//! memory as the engine makes decisions, so later records in the same feed
//! observe earlier decisions without another store round-trip.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::normalize::NormalizedRecord;

/// A category row as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCategory {
    pub id: i64,
    pub name: String,
}

/// The product columns that take part in reconciliation, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProduct {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub price: Decimal,
    pub asin: String,
    pub category_id: i64,
    pub available: bool,
    pub enabled: bool,
}

/// Everything the engine needs to know about the store, read in one pass at
/// the start of a run.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub categories: Vec<StoredCategory>,
    pub products: Vec<StoredProduct>,
}

/// How a record's category resolves within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRef {
    /// Already in the store under this id.
    Stored(i64),
    /// Not in the store yet; created on first use by the renderer.
    New(String),
}

/// The comparable state of a product, either stored or decided earlier in
/// this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedProduct {
    /// `None` for products first inserted during the current run.
    pub id: Option<i64>,
    pub title: String,
    pub price: Decimal,
    pub asin: String,
    pub category: CategoryRef,
    pub available: bool,
    pub enabled: bool,
}

impl IndexedProduct {
    /// The state a product takes once `record` is written: available and enabled.
    #[must_use]
    pub fn from_record(record: &NormalizedRecord, id: Option<i64>, category: CategoryRef) -> Self {
        Self {
            id,
            title: record.title.clone(),
            price: record.price,
            asin: record.asin.clone(),
            category,
            available: true,
            enabled: true,
        }
    }

    /// Returns `true` if any reconciled field differs. Prices compare
    /// numerically, so `9.90` and `9.9` are equal.
    #[must_use]
    pub fn differs_from(&self, other: &IndexedProduct) -> bool {
        self.title != other.title
            || self.price != other.price
            || self.asin != other.asin
            || self.category != other.category
            || self.available != other.available
            || self.enabled != other.enabled
    }
}

impl From<&StoredProduct> for IndexedProduct {
    fn from(row: &StoredProduct) -> Self {
        Self {
            id: Some(row.id),
            title: row.title.clone(),
            price: row.price,
            asin: row.asin.clone(),
            category: CategoryRef::Stored(row.category_id),
            available: row.available,
            enabled: row.enabled,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    categories: HashMap<String, CategoryRef>,
    products: HashMap<String, IndexedProduct>,
}

impl CatalogIndex {
    #[must_use]
    pub fn build(snapshot: &CatalogSnapshot) -> Self {
        let categories = snapshot
            .categories
            .iter()
            .map(|c| (c.name.clone(), CategoryRef::Stored(c.id)))
            .collect();
        let products = snapshot
            .products
            .iter()
            .map(|p| (p.code.clone(), IndexedProduct::from(p)))
            .collect();
        Self {
            categories,
            products,
        }
    }

    /// Looks up a category by exact name, registering it as [`CategoryRef::New`]
    /// if this is the first reference in the run.
    pub fn resolve_category(&mut self, name: &str) -> CategoryRef {
        self.categories
            .entry(name.to_string())
            .or_insert_with(|| CategoryRef::New(name.to_string()))
            .clone()
    }

    #[must_use]
    pub fn category(&self, name: &str) -> Option<&CategoryRef> {
        self.categories.get(name)
    }

    #[must_use]
    pub fn product(&self, code: &str) -> Option<&IndexedProduct> {
        self.products.get(code)
    }

    pub fn record_product(&mut self, code: String, product: IndexedProduct) {
        self.products.insert(code, product);
    }
}
