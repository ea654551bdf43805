//! # Fulfillment / Refund Trackers
//!
//! Two secondary state machines hanging off an order, each covering some
//! quantity of its line items.
//!
//! ## Over-Allocation Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Per line item, per tracker kind:                                       │
//! │                                                                         │
//! │     Σ quantity over non-CANCELLED trackers  ≤  ordered quantity         │
//! │                                                                         │
//! │  Checked inside the creating transaction:                               │
//! │     SELECT COALESCE(SUM(quantity), 0) of existing live lines            │
//! │     + requested > ordered  →  LineItemOverAllocated, ROLLBACK           │
//! │                                                                         │
//! │  Cancelling a tracker frees its quantities for new trackers (the sum    │
//! │  excludes CANCELLED parents).                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both trackers share the forward-only status machine
//! PENDING → PROCESSING → COMPLETED, with CANCELLED reachable from the two
//! non-terminal states. Refunds may restock: the released units go back to
//! the location the order reserved from, atomically with the refund rows.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::inventory;
use storefront_core::validation::{validate_amount_cents, validate_quantity};
use storefront_core::{CoreError, Fulfillment, FulfillmentLine, Refund, RefundLine, TrackerStatus};

/// One line item's share of a new fulfillment or refund.
#[derive(Debug, Clone)]
pub struct LineAllocation {
    pub line_item_id: String,
    pub quantity: i64,
}

/// Repository for fulfillments and refunds.
#[derive(Debug, Clone)]
pub struct FulfillmentRepository {
    pool: SqlitePool,
}

impl FulfillmentRepository {
    /// Creates a new FulfillmentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FulfillmentRepository { pool }
    }

    // =========================================================================
    // Fulfillments
    // =========================================================================

    /// Creates a PENDING fulfillment covering `lines`.
    ///
    /// ## Errors
    /// * `NotFound` - order or line item missing, or line item belongs to
    ///   another order
    /// * `LineItemOverAllocated` - a line's live fulfilled quantity would
    ///   exceed its ordered quantity
    pub async fn create_fulfillment(
        &self,
        order_id: &str,
        lines: &[LineAllocation],
        tracking_number: Option<&str>,
    ) -> DbResult<Fulfillment> {
        for line in lines {
            validate_quantity(line.quantity).map_err(CoreError::from)?;
        }

        debug!(order_id = %order_id, lines = lines.len(), "Creating fulfillment");

        let mut tx = self.pool.begin().await?;

        require_order(&mut tx, order_id).await?;

        let now = Utc::now();
        let fulfillment = Fulfillment {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            status: TrackerStatus::Pending,
            tracking_number: tracking_number.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO fulfillments (id, order_id, status, tracking_number, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&fulfillment.id)
        .bind(&fulfillment.order_id)
        .bind(fulfillment.status)
        .bind(&fulfillment.tracking_number)
        .bind(fulfillment.created_at)
        .bind(fulfillment.updated_at)
        .execute(&mut *tx)
        .await?;

        for line in lines {
            let ordered = ordered_quantity(&mut tx, order_id, &line.line_item_id).await?;
            let fulfilled = live_fulfilled(&mut tx, &line.line_item_id).await?;
            if fulfilled + line.quantity > ordered {
                return Err(over_allocated(&line.line_item_id, ordered, line.quantity));
            }

            sqlx::query(
                r#"
                INSERT INTO fulfillment_lines (id, fulfillment_id, line_item_id, quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&fulfillment.id)
            .bind(&line.line_item_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(fulfillment_id = %fulfillment.id, order_id = %order_id, "Fulfillment created");

        Ok(fulfillment)
    }

    /// Moves a fulfillment along its status machine.
    pub async fn update_fulfillment_status(
        &self,
        fulfillment_id: &str,
        next: TrackerStatus,
    ) -> DbResult<()> {
        update_tracker_status(&self.pool, "fulfillments", "Fulfillment", fulfillment_id, next)
            .await
    }

    /// Gets a fulfillment by ID.
    pub async fn get_fulfillment(&self, id: &str) -> DbResult<Option<Fulfillment>> {
        let fulfillment = sqlx::query_as::<_, Fulfillment>(
            r#"
            SELECT id, order_id, status, tracking_number, created_at, updated_at
            FROM fulfillments
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(fulfillment)
    }

    /// Gets a fulfillment's lines.
    pub async fn get_fulfillment_lines(&self, fulfillment_id: &str) -> DbResult<Vec<FulfillmentLine>> {
        let lines = sqlx::query_as::<_, FulfillmentLine>(
            r#"
            SELECT id, fulfillment_id, line_item_id, quantity
            FROM fulfillment_lines
            WHERE fulfillment_id = ?1
            ORDER BY line_item_id
            "#,
        )
        .bind(fulfillment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lists an order's fulfillments, oldest first.
    pub async fn list_fulfillments(&self, order_id: &str) -> DbResult<Vec<Fulfillment>> {
        let fulfillments = sqlx::query_as::<_, Fulfillment>(
            r#"
            SELECT id, order_id, status, tracking_number, created_at, updated_at
            FROM fulfillments
            WHERE order_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(fulfillments)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    /// Creates a PENDING refund covering `lines`.
    ///
    /// When `restock` is set, each line's quantity is released back to the
    /// order's stock location in the same transaction.
    ///
    /// ## Errors
    /// * `LineItemOverAllocated` - a line's live refunded quantity would
    ///   exceed its ordered quantity
    pub async fn create_refund(
        &self,
        order_id: &str,
        lines: &[LineAllocation],
        amount_cents: i64,
        reason: Option<&str>,
        restock: bool,
    ) -> DbResult<Refund> {
        validate_amount_cents("amount_cents", amount_cents).map_err(CoreError::from)?;
        for line in lines {
            validate_quantity(line.quantity).map_err(CoreError::from)?;
        }

        debug!(order_id = %order_id, lines = lines.len(), restock = restock, "Creating refund");

        let mut tx = self.pool.begin().await?;

        let location_id = require_order(&mut tx, order_id).await?;

        let now = Utc::now();
        let refund = Refund {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            status: TrackerStatus::Pending,
            amount_cents,
            reason: reason.map(str::to_string),
            restocked: restock,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO refunds (id, order_id, status, amount_cents, reason, restocked,
                                 created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.order_id)
        .bind(refund.status)
        .bind(refund.amount_cents)
        .bind(&refund.reason)
        .bind(refund.restocked)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .execute(&mut *tx)
        .await?;

        for line in lines {
            let ordered = ordered_quantity(&mut tx, order_id, &line.line_item_id).await?;
            let refunded = live_refunded(&mut tx, &line.line_item_id).await?;
            if refunded + line.quantity > ordered {
                return Err(over_allocated(&line.line_item_id, ordered, line.quantity));
            }

            sqlx::query(
                r#"
                INSERT INTO refund_lines (id, refund_id, line_item_id, quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&refund.id)
            .bind(&line.line_item_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;

            if restock {
                let variant_id: String =
                    sqlx::query_scalar("SELECT variant_id FROM line_items WHERE id = ?1")
                        .bind(&line.line_item_id)
                        .fetch_one(&mut *tx)
                        .await?;
                inventory::release_on(&mut tx, &variant_id, &location_id, line.quantity).await?;
            }
        }

        tx.commit().await?;

        info!(refund_id = %refund.id, order_id = %order_id, restock = restock, "Refund created");

        Ok(refund)
    }

    /// Moves a refund along its status machine.
    pub async fn update_refund_status(&self, refund_id: &str, next: TrackerStatus) -> DbResult<()> {
        update_tracker_status(&self.pool, "refunds", "Refund", refund_id, next).await
    }

    /// Gets a refund by ID.
    pub async fn get_refund(&self, id: &str) -> DbResult<Option<Refund>> {
        let refund = sqlx::query_as::<_, Refund>(
            r#"
            SELECT id, order_id, status, amount_cents, reason, restocked,
                   created_at, updated_at
            FROM refunds
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(refund)
    }

    /// Gets a refund's lines.
    pub async fn get_refund_lines(&self, refund_id: &str) -> DbResult<Vec<RefundLine>> {
        let lines = sqlx::query_as::<_, RefundLine>(
            r#"
            SELECT id, refund_id, line_item_id, quantity
            FROM refund_lines
            WHERE refund_id = ?1
            ORDER BY line_item_id
            "#,
        )
        .bind(refund_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lists an order's refunds, oldest first.
    pub async fn list_refunds(&self, order_id: &str) -> DbResult<Vec<Refund>> {
        let refunds = sqlx::query_as::<_, Refund>(
            r#"
            SELECT id, order_id, status, amount_cents, reason, restocked,
                   created_at, updated_at
            FROM refunds
            WHERE order_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(refunds)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Verifies the order exists; returns its stock location for restocks.
async fn require_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<String> {
    let location_id: Option<String> =
        sqlx::query_scalar("SELECT location_id FROM orders WHERE id = ?1")
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?;

    location_id.ok_or_else(|| DbError::not_found("Order", order_id))
}

/// Resolves a line item's ordered quantity, checking it belongs to `order_id`.
async fn ordered_quantity(
    conn: &mut SqliteConnection,
    order_id: &str,
    line_item_id: &str,
) -> DbResult<i64> {
    let row: Option<(String, i64)> =
        sqlx::query_as("SELECT order_id, quantity FROM line_items WHERE id = ?1")
            .bind(line_item_id)
            .fetch_optional(&mut *conn)
            .await?;

    match row {
        Some((owner, quantity)) if owner == order_id => Ok(quantity),
        _ => Err(DbError::not_found("LineItem", line_item_id)),
    }
}

/// Quantity already covered by non-cancelled fulfillments.
async fn live_fulfilled(conn: &mut SqliteConnection, line_item_id: &str) -> DbResult<i64> {
    let sum: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(fl.quantity), 0)
        FROM fulfillment_lines fl
        INNER JOIN fulfillments f ON f.id = fl.fulfillment_id
        WHERE fl.line_item_id = ?1 AND f.status != 'CANCELLED'
        "#,
    )
    .bind(line_item_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(sum)
}

/// Quantity already covered by non-cancelled refunds.
async fn live_refunded(conn: &mut SqliteConnection, line_item_id: &str) -> DbResult<i64> {
    let sum: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(rl.quantity), 0)
        FROM refund_lines rl
        INNER JOIN refunds r ON r.id = rl.refund_id
        WHERE rl.line_item_id = ?1 AND r.status != 'CANCELLED'
        "#,
    )
    .bind(line_item_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(sum)
}

fn over_allocated(line_item_id: &str, ordered: i64, requested: i64) -> DbError {
    DbError::Core(CoreError::LineItemOverAllocated {
        line_item_id: line_item_id.to_string(),
        ordered,
        requested,
    })
}

/// Shared guarded status transition for the two tracker tables.
async fn update_tracker_status(
    pool: &SqlitePool,
    table: &str,
    entity: &str,
    id: &str,
    next: TrackerStatus,
) -> DbResult<()> {
    debug!(entity = entity, id = %id, next = %next, "Updating tracker status");

    let mut tx = pool.begin().await?;

    let current: Option<TrackerStatus> =
        sqlx::query_scalar(&format!("SELECT status FROM {table} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

    let current = current.ok_or_else(|| DbError::not_found(entity, id))?;

    if !current.can_transition_to(next) {
        return Err(DbError::Core(CoreError::InvalidTrackerTransition {
            entity: entity.to_string(),
            id: id.to_string(),
            from: current.to_string(),
            to: next.to_string(),
        }));
    }

    // Conditional on the observed status so a raced transition fails
    let now = Utc::now();
    let result = sqlx::query(&format!(
        "UPDATE {table} SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2"
    ))
    .bind(id)
    .bind(current)
    .bind(next)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        let actual: Option<TrackerStatus> =
            sqlx::query_scalar(&format!("SELECT status FROM {table} WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let actual = actual.ok_or_else(|| DbError::not_found(entity, id))?;
        return Err(DbError::Core(CoreError::InvalidTrackerTransition {
            entity: entity.to_string(),
            id: id.to_string(),
            from: actual.to_string(),
            to: next.to_string(),
        }));
    }

    tx.commit().await?;
    Ok(())
}
