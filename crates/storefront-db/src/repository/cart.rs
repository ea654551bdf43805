//! # Cart Store
//!
//! Guarded cart and cart-item mutations.
//!
//! ## Write Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Guarded Mutation Pattern                             │
//! │                                                                         │
//! │  Every mutation runs in one transaction whose FIRST statement is:       │
//! │                                                                         │
//! │     UPDATE carts SET updated_at = ?                                     │
//! │     WHERE id = ? AND status = 'OPEN'                                    │
//! │                                                                         │
//! │  rows_affected == 1 → cart is OPEN, write lock held, updated_at         │
//! │                       bumped (every mutation must bump it anyway)       │
//! │  rows_affected == 0 → SELECT status to distinguish:                     │
//! │                       no row  → NotFound                                │
//! │                       ORDERED → CartNotOpen                             │
//! │                                                                         │
//! │  The status check and the item write share the same write lock, so      │
//! │  there is no check/act window for a concurrent checkout to slip into.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Items are unique per (cart, variant): `add_item` on an existing pair is
//! `DuplicateVariant`; callers update the quantity instead.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use storefront_core::validation::validate_quantity;
use storefront_core::{Cart, CartItem, CartStatus, CoreError};

/// Repository for cart operations.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Creates a new OPEN cart.
    pub async fn create_cart(&self, customer_id: Option<&str>) -> DbResult<Cart> {
        let now = Utc::now();
        let cart = Cart {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.map(str::to_string),
            status: CartStatus::Open,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %cart.id, "Creating cart");

        sqlx::query(
            r#"
            INSERT INTO carts (id, customer_id, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&cart.id)
        .bind(&cart.customer_id)
        .bind(cart.status)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(cart)
    }

    /// Gets a cart by ID.
    pub async fn get_cart(&self, id: &str) -> DbResult<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>(
            r#"
            SELECT id, customer_id, status, created_at, updated_at
            FROM carts
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cart)
    }

    /// Gets all items for a cart.
    pub async fn get_items(&self, cart_id: &str) -> DbResult<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT id, cart_id, variant_id, quantity, created_at, updated_at
            FROM cart_items
            WHERE cart_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Adds a variant to a cart.
    ///
    /// ## Errors
    /// * `CartNotOpen` - cart already checked out
    /// * `DuplicateVariant` - (cart, variant) already present
    /// * `NotFound` - cart or variant missing
    pub async fn add_item(&self, cart_id: &str, variant_id: &str, qty: i64) -> DbResult<CartItem> {
        validate_quantity(qty).map_err(CoreError::from)?;

        debug!(cart_id = %cart_id, variant_id = %variant_id, qty = %qty, "Adding cart item");

        let mut tx = self.pool.begin().await?;

        touch_open_cart(&mut tx, cart_id).await?;

        // FK violations don't say which entity was missing; check up front
        let variant_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM variants WHERE id = ?1")
            .bind(variant_id)
            .fetch_optional(&mut *tx)
            .await?;
        if variant_exists.is_none() {
            return Err(DbError::not_found("Variant", variant_id));
        }

        let now = Utc::now();
        let item = CartItem {
            id: Uuid::new_v4().to_string(),
            cart_id: cart_id.to_string(),
            variant_id: variant_id.to_string(),
            quantity: qty,
            created_at: now,
            updated_at: now,
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, variant_id, quantity, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(&item.cart_id)
        .bind(&item.variant_id)
        .bind(item.quantity)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) => {
                let db_err = DbError::from(e);
                if db_err.is_unique_violation_on("cart_items") {
                    return Err(DbError::Core(CoreError::DuplicateVariant {
                        cart_id: cart_id.to_string(),
                        variant_id: variant_id.to_string(),
                    }));
                }
                return Err(db_err);
            }
        }

        tx.commit().await?;
        Ok(item)
    }

    /// Updates the quantity of a cart item.
    pub async fn update_item(&self, item_id: &str, qty: i64) -> DbResult<()> {
        validate_quantity(qty).map_err(CoreError::from)?;

        debug!(item_id = %item_id, qty = %qty, "Updating cart item");

        let mut tx = self.pool.begin().await?;

        let cart_id = item_cart_id(&mut tx, item_id).await?;
        touch_open_cart(&mut tx, &cart_id).await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE cart_items SET quantity = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .bind(qty)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Removes a cart item.
    pub async fn remove_item(&self, item_id: &str) -> DbResult<()> {
        debug!(item_id = %item_id, "Removing cart item");

        let mut tx = self.pool.begin().await?;

        let cart_id = item_cart_id(&mut tx, item_id).await?;
        touch_open_cart(&mut tx, &cart_id).await?;

        sqlx::query("DELETE FROM cart_items WHERE id = ?1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Moves an item to another cart.
    ///
    /// Both source and destination must be OPEN; any failure rolls back and
    /// leaves both carts unchanged (no partial move).
    ///
    /// ## Errors
    /// * `CartNotOpen` - either cart is not OPEN
    /// * `DuplicateVariant` - destination already holds this variant
    pub async fn move_item(&self, item_id: &str, dest_cart_id: &str) -> DbResult<()> {
        debug!(item_id = %item_id, dest_cart_id = %dest_cart_id, "Moving cart item");

        let mut tx = self.pool.begin().await?;

        let source_cart_id = item_cart_id(&mut tx, item_id).await?;
        touch_open_cart(&mut tx, &source_cart_id).await?;
        touch_open_cart(&mut tx, dest_cart_id).await?;

        let now = Utc::now();
        let moved = sqlx::query(
            r#"
            UPDATE cart_items SET cart_id = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .bind(dest_cart_id)
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = moved {
            let db_err = DbError::from(e);
            if db_err.is_unique_violation_on("cart_items") {
                let variant_id: String =
                    sqlx::query_scalar("SELECT variant_id FROM cart_items WHERE id = ?1")
                        .bind(item_id)
                        .fetch_one(&mut *tx)
                        .await?;
                return Err(DbError::Core(CoreError::DuplicateVariant {
                    cart_id: dest_cart_id.to_string(),
                    variant_id,
                }));
            }
            return Err(db_err);
        }

        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// The write guard: bumps `updated_at` iff the cart is OPEN, taking the
/// write lock in the same statement as the status check.
///
/// Used by every cart mutation. Checkout runs its own read-based guard
/// because it also needs the cart's customer_id.
pub(crate) async fn touch_open_cart(conn: &mut SqliteConnection, cart_id: &str) -> DbResult<()> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE carts SET updated_at = ?2
        WHERE id = ?1 AND status = 'OPEN'
        "#,
    )
    .bind(cart_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let status: Option<CartStatus> = sqlx::query_scalar("SELECT status FROM carts WHERE id = ?1")
            .bind(cart_id)
            .fetch_optional(&mut *conn)
            .await?;

        return match status {
            None => Err(DbError::not_found("Cart", cart_id)),
            Some(_) => Err(DbError::Core(CoreError::CartNotOpen {
                cart_id: cart_id.to_string(),
            })),
        };
    }

    Ok(())
}

/// Resolves a cart item's parent cart, or `NotFound`.
async fn item_cart_id(conn: &mut SqliteConnection, item_id: &str) -> DbResult<String> {
    let cart_id: Option<String> = sqlx::query_scalar("SELECT cart_id FROM cart_items WHERE id = ?1")
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;

    cart_id.ok_or_else(|| DbError::not_found("CartItem", item_id))
}
