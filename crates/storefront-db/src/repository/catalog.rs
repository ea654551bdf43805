//! # Catalog Repository
//!
//! Variant lookups for the commerce core.
//!
//! The catalog service owns variant lifecycle; from the core's perspective
//! variants are read-only collaborators consulted at checkout time to
//! freeze title/sku/price onto line items. The insert below exists for
//! provisioning and seeding only.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use storefront_core::Variant;

/// Repository for variant lookups.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets a variant by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Variant))` - Variant found
    /// * `Ok(None)` - Variant not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>(
            r#"
            SELECT id, title, sku, price_cents, grams, created_at, updated_at
            FROM variants
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    /// Gets a variant by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>(
            r#"
            SELECT id, title, sku, price_cents, grams, created_at, updated_at
            FROM variants
            WHERE sku = ?1
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    /// Inserts a variant. Provisioning/seeding only - the catalog service
    /// owns variant lifecycle in production.
    pub async fn insert(&self, title: &str, sku: &str, price_cents: i64, grams: i64) -> DbResult<Variant> {
        let now = Utc::now();
        let variant = Variant {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            sku: sku.to_string(),
            price_cents,
            grams,
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %variant.sku, "Inserting variant");

        sqlx::query(
            r#"
            INSERT INTO variants (id, title, sku, price_cents, grams, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.title)
        .bind(&variant.sku)
        .bind(variant.price_cents)
        .bind(variant.grams)
        .bind(variant.created_at)
        .bind(variant.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(variant)
    }
}
