//! Write primitives used by the live renderer.
//!
//! Category and tag creation is create-if-absent keyed on the unique `name`
//! column. [`Resolver`] caches name→id lookups for the duration of one run so
//! later records never re-query a name an earlier record already resolved.

use std::collections::HashMap;

use catsync_core::{CategoryRef, NormalizedRecord};
use sqlx::PgPool;

use crate::DbError;

/// Run-scoped category and tag caches.
#[derive(Debug, Default)]
pub struct Resolver {
    categories: HashMap<String, i64>,
    tags: HashMap<String, i64>,
}

impl Resolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns a planned category reference into a row id, creating the row for
    /// names the planner had not seen in the store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the create or the lookup fails.
    pub async fn category_id(
        &mut self,
        pool: &PgPool,
        category: &CategoryRef,
    ) -> Result<i64, DbError> {
        match category {
            CategoryRef::Stored(id) => Ok(*id),
            CategoryRef::New(name) => self.ensure_category(pool, name).await,
        }
    }

    /// Returns the id of the category called `name`, inserting it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the store rejects the name or the query
    /// fails, or [`DbError::NotFound`] if the row vanished after the insert
    /// conflicted.
    pub async fn ensure_category(&mut self, pool: &PgPool, name: &str) -> Result<i64, DbError> {
        if let Some(id) = self.categories.get(name) {
            return Ok(*id);
        }
        let id = ensure_named_row(pool, NamedTable::Categories, name).await?;
        self.categories.insert(name.to_string(), id);
        Ok(id)
    }

    /// Returns the id of the tag called `name`, inserting it if absent.
    ///
    /// `name` must already be normalized (trimmed, lower-cased).
    ///
    /// # Errors
    ///
    /// Same as [`Resolver::ensure_category`].
    pub async fn ensure_tag(&mut self, pool: &PgPool, name: &str) -> Result<i64, DbError> {
        if let Some(id) = self.tags.get(name) {
            return Ok(*id);
        }
        let id = ensure_named_row(pool, NamedTable::Tags, name).await?;
        self.tags.insert(name.to_string(), id);
        Ok(id)
    }
}

#[derive(Debug, Clone, Copy)]
enum NamedTable {
    Categories,
    Tags,
}

impl NamedTable {
    fn ensure_sql(self) -> &'static str {
        match self {
            NamedTable::Categories => {
                "WITH ins AS ( \
                     INSERT INTO categories (name) VALUES ($1) \
                     ON CONFLICT (name) DO NOTHING \
                     RETURNING id \
                 ) \
                 SELECT id FROM ins \
                 UNION ALL \
                 SELECT id FROM categories WHERE name = $1 \
                 LIMIT 1"
            }
            NamedTable::Tags => {
                "WITH ins AS ( \
                     INSERT INTO tags (name, enabled) VALUES ($1, TRUE) \
                     ON CONFLICT (name) DO NOTHING \
                     RETURNING id \
                 ) \
                 SELECT id FROM ins \
                 UNION ALL \
                 SELECT id FROM tags WHERE name = $1 \
                 LIMIT 1"
            }
        }
    }

    fn lookup_sql(self) -> &'static str {
        match self {
            NamedTable::Categories => "SELECT id FROM categories WHERE name = $1",
            NamedTable::Tags => "SELECT id FROM tags WHERE name = $1",
        }
    }
}

async fn ensure_named_row(pool: &PgPool, table: NamedTable, name: &str) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(table.ensure_sql())
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if let Some(id) = id {
        return Ok(id);
    }

    // A concurrent insert committed after this statement's snapshot was taken.
    sqlx::query_scalar::<_, i64>(table.lookup_sql())
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Inserts or updates the product keyed by `record.code` and returns its id.
///
/// The row always comes out `available = TRUE, enabled = TRUE`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails (including an `asin` that
/// already belongs to another product).
pub async fn upsert_product(
    pool: &PgPool,
    record: &NormalizedRecord,
    category_id: i64,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO products (title, price, code, asin, category_id, available, enabled) \
         VALUES ($1, $2, $3, $4, $5, TRUE, TRUE) \
         ON CONFLICT (code) DO UPDATE SET \
             title       = EXCLUDED.title, \
             price       = EXCLUDED.price, \
             asin        = EXCLUDED.asin, \
             category_id = EXCLUDED.category_id, \
             available   = TRUE, \
             enabled     = TRUE, \
             modified_at = NOW() \
         RETURNING id",
    )
    .bind(&record.title)
    .bind(record.price)
    .bind(&record.code)
    .bind(&record.asin)
    .bind(category_id)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Creates or overwrites the product's detail row with `main_image`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_main_image(
    pool: &PgPool,
    product_id: i64,
    main_image: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO product_details (product_id, main_image) \
         VALUES ($1, $2) \
         ON CONFLICT (product_id) DO UPDATE SET main_image = EXCLUDED.main_image",
    )
    .bind(product_id)
    .bind(main_image)
    .execute(pool)
    .await?;

    Ok(())
}

/// Associates a product with a tag unless the pair already exists.
///
/// Returns `true` when a new association row was written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn link_product_tag(pool: &PgPool, product_id: i64, tag_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO product_tags (product_id, tag_id) \
         SELECT $1, $2 \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM product_tags WHERE product_id = $1 AND tag_id = $2 \
         ) \
         ON CONFLICT (product_id, tag_id) DO NOTHING",
    )
    .bind(product_id)
    .bind(tag_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Flips one product to `available = FALSE`.
///
/// Returns `false` when the code is unknown or the product was already
/// unavailable.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_unavailable(pool: &PgPool, code: &str) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE products \
         SET available = FALSE, modified_at = NOW() \
         WHERE code = $1 AND available",
    )
    .bind(code)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
