//! # Order Repository
//!
//! Reads over the immutable order snapshot plus the two mutations an order
//! supports after creation: status transitions and cancellation.
//!
//! ## State Machine Enforcement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │             PENDING ──► PROCESSING ──► COMPLETED ──► REFUNDED           │
//! │                │  ▲          │ ▲           │              │             │
//! │                │  └─ ON_HOLD ┘ │           │              │             │
//! │                │               │           ▼              ▼             │
//! │                └── CANCELLED / FAILED ──► ARCHIVED ◄──────┘             │
//! │                                                                         │
//! │  `update_status` re-checks the transition with a conditional UPDATE     │
//! │  (WHERE status = <observed>), so a concurrent transition cannot be      │
//! │  silently overwritten.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancellation is the one transition with a side effect: it releases the
//! order's reservations back to the location checkout took them from, net
//! of units a restocking refund already put back, in the same transaction
//! as the status flip.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::inventory;
use storefront_core::{
    CoreError, DiscountAllocation, LineItem, Order, OrderAddress, OrderStatus,
};

const ORDER_COLUMNS: &str = r#"
    id, cart_id, customer_id, status, currency, location_id,
    subtotal_cents, total_discounts_cents, total_tax_cents,
    shipping_cents, total_cents, total_weight, weight_unit,
    created_at, updated_at
"#;

/// Repository for order reads, status transitions and cancellation.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Gets the order produced by a cart, if checkout has run.
    pub async fn get_by_cart(&self, cart_id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE cart_id = ?1"
        ))
        .bind(cart_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Gets an order's frozen line item snapshots.
    pub async fn get_line_items(&self, order_id: &str) -> DbResult<Vec<LineItem>> {
        let items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT id, order_id, variant_id, title, sku,
                   unit_price_cents, unit_tax_cents, quantity,
                   discount_cents, total_cents, created_at
            FROM line_items
            WHERE order_id = ?1
            ORDER BY variant_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Gets an order's address snapshots (BILLING first).
    pub async fn get_addresses(&self, order_id: &str) -> DbResult<Vec<OrderAddress>> {
        let addresses = sqlx::query_as::<_, OrderAddress>(
            r#"
            SELECT id, order_id, kind, first_name, last_name,
                   line1, line2, city, region, postal_code, country, phone,
                   created_at
            FROM order_addresses
            WHERE order_id = ?1
            ORDER BY kind
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(addresses)
    }

    /// Gets the discount allocations recorded against an order.
    pub async fn get_allocations(&self, order_id: &str) -> DbResult<Vec<DiscountAllocation>> {
        let allocations = sqlx::query_as::<_, DiscountAllocation>(
            r#"
            SELECT id, discount_id, order_id, line_item_id, amount_cents, created_at
            FROM discount_allocations
            WHERE order_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(allocations)
    }

    /// Moves an order to a new status, enforcing the transition table.
    ///
    /// For `CANCELLED` use [`cancel`](Self::cancel) instead so the
    /// reservations are released.
    ///
    /// ## Errors
    /// * `NotFound` - no such order
    /// * `InvalidOrderTransition` - the move is not in the table
    pub async fn update_status(&self, order_id: &str, next: OrderStatus) -> DbResult<Order> {
        debug!(order_id = %order_id, next = %next, "Updating order status");

        let mut tx = self.pool.begin().await?;

        let current = order_status(&mut tx, order_id).await?;
        if !current.can_transition_to(next) {
            return Err(invalid_transition(order_id, current, next));
        }

        // Conditional on the observed status so a raced transition fails
        // instead of being overwritten
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(order_id)
        .bind(current)
        .bind(next)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let actual = order_status(&mut tx, order_id).await?;
            return Err(invalid_transition(order_id, actual, next));
        }

        tx.commit().await?;

        info!(order_id = %order_id, from = %current, to = %next, "Order status updated");

        self.get_by_id(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))
    }

    /// Cancels an order and releases its reservations.
    ///
    /// Status flip and inventory releases commit as one transaction; a
    /// cancelled order's stock is fully available again or not at all.
    ///
    /// ## Errors
    /// * `InvalidOrderTransition` - order is not in a cancellable state
    pub async fn cancel(&self, order_id: &str) -> DbResult<Order> {
        debug!(order_id = %order_id, "Cancelling order");

        let mut tx = self.pool.begin().await?;

        let (current, location_id): (OrderStatus, String) =
            sqlx::query_as("SELECT status, location_id FROM orders WHERE id = ?1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| DbError::not_found("Order", order_id))?;

        if !current.is_cancellable() {
            return Err(invalid_transition(order_id, current, OrderStatus::Cancelled));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = 'CANCELLED', updated_at = ?3
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(order_id)
        .bind(current)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let actual = order_status(&mut tx, order_id).await?;
            return Err(invalid_transition(order_id, actual, OrderStatus::Cancelled));
        }

        // Put the reserved units back where checkout took them from, minus
        // anything a restocking refund already released. Restocks happen at
        // refund creation and are never reversed, so every restocked refund
        // counts here regardless of its current status.
        let lines: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT id, variant_id, quantity FROM line_items
            WHERE order_id = ?1
            ORDER BY variant_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        for (line_item_id, variant_id, quantity) in &lines {
            let restocked: i64 = sqlx::query_scalar(
                r#"
                SELECT COALESCE(SUM(rl.quantity), 0)
                FROM refund_lines rl
                INNER JOIN refunds r ON r.id = rl.refund_id
                WHERE rl.line_item_id = ?1 AND r.restocked = 1
                "#,
            )
            .bind(line_item_id)
            .fetch_one(&mut *tx)
            .await?;

            let remaining = (quantity - restocked).max(0);
            if remaining > 0 {
                inventory::release_on(&mut tx, variant_id, &location_id, remaining).await?;
            }
        }

        tx.commit().await?;

        info!(order_id = %order_id, lines = lines.len(), "Order cancelled, stock released");

        self.get_by_id(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn order_status(
    conn: &mut sqlx::SqliteConnection,
    order_id: &str,
) -> DbResult<OrderStatus> {
    let status: Option<OrderStatus> =
        sqlx::query_scalar("SELECT status FROM orders WHERE id = ?1")
            .bind(order_id)
            .fetch_optional(conn)
            .await?;

    status.ok_or_else(|| DbError::not_found("Order", order_id))
}

fn invalid_transition(order_id: &str, from: OrderStatus, to: OrderStatus) -> DbError {
    DbError::Core(CoreError::InvalidOrderTransition {
        order_id: order_id.to_string(),
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    })
}
