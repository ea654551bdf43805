//! # Inventory Ledger
//!
//! Per (variant, location) available-quantity counters.
//!
//! ## Atomic Check-and-Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reservation Strategy                                 │
//! │                                                                         │
//! │  ❌ WRONG: read-then-write (lost update under concurrency)             │
//! │     SELECT quantity ... ; if quantity >= n { UPDATE ... }               │
//! │                                                                         │
//! │  ✅ CORRECT: single conditional statement                               │
//! │     UPDATE inventory_levels SET quantity = quantity - n                 │
//! │     WHERE variant_id = ? AND location_id = ? AND quantity >= n          │
//! │                                                                         │
//! │  rows_affected == 0 → InsufficientStock (or NotFound if no level row)   │
//! │                                                                         │
//! │  Two concurrent checkouts competing for the same stock serialize on    │
//! │  the write lock; the condition re-evaluates under it, so the counter   │
//! │  can never go negative.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `release` (cancellations, restocking refunds) always succeeds and only
//! ever increases the counter. "Never exceed a logical maximum" is business
//! policy, not an invariant enforced here.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use storefront_core::{CoreError, InventoryLevel};

/// Repository for inventory level operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Gets the inventory level for a (variant, location) pair.
    pub async fn get_level(
        &self,
        variant_id: &str,
        location_id: &str,
    ) -> DbResult<Option<InventoryLevel>> {
        let level = sqlx::query_as::<_, InventoryLevel>(
            r#"
            SELECT variant_id, location_id, quantity, updated_at
            FROM inventory_levels
            WHERE variant_id = ?1 AND location_id = ?2
            "#,
        )
        .bind(variant_id)
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(level)
    }

    /// Sets the absolute quantity for a (variant, location) pair.
    /// Provisioning/receiving only - the transactional flows use
    /// `reserve`/`release` deltas.
    pub async fn set_level(
        &self,
        variant_id: &str,
        location_id: &str,
        quantity: i64,
    ) -> DbResult<()> {
        debug!(variant_id = %variant_id, location_id = %location_id, quantity = %quantity, "Setting inventory level");

        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO inventory_levels (variant_id, location_id, quantity, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (variant_id, location_id)
            DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at
            "#,
        )
        .bind(variant_id)
        .bind(location_id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reserves `qty` units, failing with `InsufficientStock` if the
    /// counter would go negative.
    pub async fn reserve(&self, variant_id: &str, location_id: &str, qty: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        reserve_on(&mut tx, variant_id, location_id, qty).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Releases `qty` units back. Always succeeds.
    pub async fn release(&self, variant_id: &str, location_id: &str, qty: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        release_on(&mut tx, variant_id, location_id, qty).await?;
        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Connection-Scoped Helpers
// =============================================================================
// The checkout, refund, and cancellation transactions compose reservations
// with their other writes; these helpers run on the caller's connection so
// everything commits or rolls back as one unit.

/// Atomic conditional decrement on an existing connection/transaction.
pub(crate) async fn reserve_on(
    conn: &mut SqliteConnection,
    variant_id: &str,
    location_id: &str,
    qty: i64,
) -> DbResult<()> {
    debug!(variant_id = %variant_id, location_id = %location_id, qty = %qty, "Reserving inventory");

    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE inventory_levels
        SET quantity = quantity - ?3, updated_at = ?4
        WHERE variant_id = ?1 AND location_id = ?2 AND quantity >= ?3
        "#,
    )
    .bind(variant_id)
    .bind(location_id)
    .bind(qty)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        // Distinguish "not enough" from "no such level"
        let exists: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT quantity FROM inventory_levels
            WHERE variant_id = ?1 AND location_id = ?2
            "#,
        )
        .bind(variant_id)
        .bind(location_id)
        .fetch_optional(&mut *conn)
        .await?;

        return match exists {
            Some(_) => Err(DbError::Core(CoreError::InsufficientStock {
                variant_id: variant_id.to_string(),
                location_id: location_id.to_string(),
                requested: qty,
            })),
            None => Err(DbError::not_found(
                "InventoryLevel",
                format!("{variant_id}@{location_id}"),
            )),
        };
    }

    Ok(())
}

/// Upsert increment on an existing connection/transaction. Never fails on
/// quantity grounds.
pub(crate) async fn release_on(
    conn: &mut SqliteConnection,
    variant_id: &str,
    location_id: &str,
    qty: i64,
) -> DbResult<()> {
    debug!(variant_id = %variant_id, location_id = %location_id, qty = %qty, "Releasing inventory");

    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO inventory_levels (variant_id, location_id, quantity, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (variant_id, location_id)
        DO UPDATE SET quantity = quantity + excluded.quantity, updated_at = excluded.updated_at
        "#,
    )
    .bind(variant_id)
    .bind(location_id)
    .bind(qty)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
