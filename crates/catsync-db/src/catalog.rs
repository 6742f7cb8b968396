//! Read side of the catalog: snapshot loading for the planner and listing for
//! the API.

use catsync_core::{CatalogSnapshot, StoredCategory, StoredProduct};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `categories` table, as far as reconciliation cares.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
}

/// The reconciled columns of a `products` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub price: Decimal,
    pub asin: String,
    pub category_id: i64,
    pub available: bool,
    pub enabled: bool,
}

/// A product joined with its category name, main image, and sorted tag names.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductListRow {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub price: Decimal,
    pub asin: String,
    pub category: String,
    pub main_image: Option<String>,
    pub tags: Vec<String>,
    pub available: bool,
    pub enabled: bool,
    pub modified_at: DateTime<Utc>,
}

impl From<CategoryRow> for StoredCategory {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

impl From<ProductRow> for StoredProduct {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            title: row.title,
            price: row.price,
            asin: row.asin,
            category_id: row.category_id,
            available: row.available,
            enabled: row.enabled,
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Reads every category and product into a [`CatalogSnapshot`].
///
/// The two reads are not isolated from each other; a concurrent writer can
/// make the snapshot stale. Live application tolerates that.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn load_catalog_snapshot(pool: &PgPool) -> Result<CatalogSnapshot, DbError> {
    let categories = sqlx::query_as::<_, CategoryRow>("SELECT id, name FROM categories ORDER BY id")
        .fetch_all(pool)
        .await?;

    let products = sqlx::query_as::<_, ProductRow>(
        "SELECT id, code, title, price, asin, category_id, available, enabled \
         FROM products \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(CatalogSnapshot {
        categories: categories.into_iter().map(StoredCategory::from).collect(),
        products: products.into_iter().map(StoredProduct::from).collect(),
    })
}

/// Lists products ordered by `code`, optionally only the available ones.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    available_only: bool,
    limit: i64,
) -> Result<Vec<ProductListRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductListRow>(
        "SELECT p.id, p.code, p.title, p.price, p.asin, c.name AS category, \
                d.main_image, \
                COALESCE( \
                    ARRAY( \
                        SELECT t.name FROM product_tags pt \
                        JOIN tags t ON t.id = pt.tag_id \
                        WHERE pt.product_id = p.id \
                        ORDER BY t.name \
                    ), \
                    ARRAY[]::TEXT[] \
                ) AS tags, \
                p.available, p.enabled, p.modified_at \
         FROM products p \
         JOIN categories c ON c.id = p.category_id \
         LEFT JOIN product_details d ON d.product_id = p.id \
         WHERE ($1 = FALSE OR p.available) \
         ORDER BY p.code \
         LIMIT $2",
    )
    .bind(available_only)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
