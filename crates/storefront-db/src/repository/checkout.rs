//! # Checkout Orchestrator
//!
//! The atomic cart → order transition.
//!
//! ## The Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Checkout: one atomic unit                            │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   1. Read cart        ── missing → NotFound                            │
//! │   2. Status check     ── ORDERED → CartAlreadyOrdered (idempotent)      │
//! │   3. Load items+variants, sorted by variant id ── none → EmptyCart      │
//! │   4. reserve × N      ── any shortfall → InsufficientStock, ROLLBACK    │
//! │   5. Evaluate discounts, compute totals (all in memory)                 │
//! │   6. INSERT order (PENDING)                                             │
//! │   7. INSERT line item snapshots × N                                     │
//! │   8. INSERT address snapshots (BILLING + optional SHIPPING)             │
//! │   9. INSERT discount allocations × M                                    │
//! │  10. UPDATE carts SET status='ORDERED' WHERE id=? AND status='OPEN'     │
//! │      └── rows_affected == 0 → CartAlreadyOrdered, ROLLBACK              │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any error between BEGIN and COMMIT rolls back everything, including    │
//! │  the inventory decrements: the cart stays OPEN and unchanged.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why the conditional flip catches the race
//! Two checkouts on one cart can both pass the step-2 read (it only takes a
//! read lock). They then serialize on SQLite's single writer; the loser's
//! step-10 UPDATE matches zero rows because the winner already committed
//! `ORDERED`, so the loser rolls back — including its reservations. The
//! transition is exactly-once per cart. Reservations are acquired in sorted
//! (variant, location) order so overlapping checkouts cannot deadlock.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::inventory;
use storefront_core::discount::evaluate;
use storefront_core::validation::{validate_amount_cents, validate_currency, validate_discount_code};
use storefront_core::{
    AddressKind, AddressSnapshot, CoreError, Discount, DiscountApplication, LineItem, Money, Order,
    OrderStatus, WeightUnit,
};

// =============================================================================
// Request Types
// =============================================================================

/// Caller-supplied per-unit tax for one variant's line.
///
/// Tax computation is out of scope for the core; whoever computed it hands
/// the figures in and they are snapshotted like everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineTax {
    pub variant_id: String,
    pub unit_tax_cents: i64,
}

/// Everything checkout needs besides the cart itself.
///
/// Addresses arrive by value (copied from the address book, never
/// referenced); shipping price arrives precomputed for the same reason as
/// tax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub billing: AddressSnapshot,
    pub shipping: Option<AddressSnapshot>,
    pub discount_codes: Vec<String>,
    pub currency: String,
    /// Stock location to reserve from.
    pub location_id: String,
    pub shipping_cents: i64,
    pub line_taxes: Vec<LineTax>,
}

/// A cart item joined with its variant, as read inside the transaction.
#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    variant_id: String,
    quantity: i64,
    title: String,
    sku: String,
    price_cents: i64,
    grams: i64,
}

// =============================================================================
// Repository
// =============================================================================

/// The checkout orchestrator.
#[derive(Debug, Clone)]
pub struct CheckoutRepository {
    pool: SqlitePool,
}

impl CheckoutRepository {
    /// Creates a new CheckoutRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CheckoutRepository { pool }
    }

    /// Converts an OPEN cart into a PENDING order.
    ///
    /// ## Errors
    /// * `CartAlreadyOrdered` - idempotent guard; the call is a no-op
    /// * `EmptyCart` - nothing to order
    /// * `InsufficientStock` - some reservation failed; everything rolled back
    /// * `DiscountNotActive` / `NotFound` - bad discount code
    pub async fn checkout(&self, cart_id: &str, request: CheckoutRequest) -> DbResult<Order> {
        validate_currency(&request.currency).map_err(CoreError::from)?;
        validate_amount_cents("shipping_cents", request.shipping_cents).map_err(CoreError::from)?;
        for code in &request.discount_codes {
            validate_discount_code(code).map_err(CoreError::from)?;
        }

        debug!(cart_id = %cart_id, codes = request.discount_codes.len(), "Starting checkout");

        let mut tx = self.pool.begin().await?;

        // Steps 1-2: existence + idempotent status guard. A raced second
        // checkout that slips past this read is caught by the final flip.
        let cart: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT status, customer_id FROM carts WHERE id = ?1")
                .bind(cart_id)
                .fetch_optional(&mut *tx)
                .await?;

        let customer_id = match cart {
            None => return Err(DbError::not_found("Cart", cart_id)),
            Some((status, _)) if status != "OPEN" => {
                return Err(DbError::Core(CoreError::CartAlreadyOrdered {
                    cart_id: cart_id.to_string(),
                }))
            }
            Some((_, customer_id)) => customer_id,
        };

        // Step 3: load items with their variant snapshots, in sorted order
        // so concurrent checkouts acquire inventory locks consistently.
        let items = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT ci.variant_id, ci.quantity,
                   v.title, v.sku, v.price_cents, v.grams
            FROM cart_items ci
            INNER JOIN variants v ON v.id = ci.variant_id
            WHERE ci.cart_id = ?1
            ORDER BY ci.variant_id
            "#,
        )
        .bind(cart_id)
        .fetch_all(&mut *tx)
        .await?;

        if items.is_empty() {
            return Err(DbError::Core(CoreError::EmptyCart {
                cart_id: cart_id.to_string(),
            }));
        }

        // Step 4: all-or-nothing reservations. A failure here aborts the
        // transaction, rolling back reservations already made this attempt.
        for item in &items {
            inventory::reserve_on(&mut tx, &item.variant_id, &request.location_id, item.quantity)
                .await?;
        }

        // Step 5: snapshot lines in memory and run the discount evaluator.
        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();

        let mut lines: Vec<LineItem> = items
            .iter()
            .map(|item| {
                let unit_tax_cents = request
                    .line_taxes
                    .iter()
                    .find(|t| t.variant_id == item.variant_id)
                    .map_or(0, |t| t.unit_tax_cents);
                let gross = Money::from_cents(item.price_cents).multiply_quantity(item.quantity);
                LineItem {
                    id: Uuid::new_v4().to_string(),
                    order_id: order_id.clone(),
                    variant_id: item.variant_id.clone(),
                    title: item.title.clone(),
                    sku: item.sku.clone(),
                    unit_price_cents: item.price_cents,
                    unit_tax_cents,
                    quantity: item.quantity,
                    discount_cents: 0,
                    total_cents: gross.cents(),
                    created_at: now,
                }
            })
            .collect();

        let subtotal: Money = lines
            .iter()
            .map(|l| Money::from_cents(l.unit_price_cents).multiply_quantity(l.quantity))
            .sum();
        let shipping = Money::from_cents(request.shipping_cents);

        // (discount_id, line_item_id, amount)
        let mut allocations: Vec<(String, Option<String>, Money)> = Vec::new();

        for code in &request.discount_codes {
            let discount = sqlx::query_as::<_, Discount>(
                r#"
                SELECT id, code, application, method, value, status,
                       starts_at, ends_at, created_at, updated_at
                FROM discounts
                WHERE code = ?1
                "#,
            )
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Discount", code))?;

            match discount.application {
                // Recorded once against the order subtotal
                DiscountApplication::Order => {
                    let amount = evaluate(&discount, subtotal, now)?;
                    allocations.push((discount.id.clone(), None, amount));
                }
                // Evaluated and recorded per eligible line
                DiscountApplication::LineItem => {
                    for line in &mut lines {
                        let base = Money::from_cents(line.total_cents);
                        let amount = evaluate(&discount, base, now)?;
                        line.discount_cents += amount.cents();
                        line.total_cents -= amount.cents();
                        allocations.push((discount.id.clone(), Some(line.id.clone()), amount));
                    }
                }
                // Applies against the shipping price only
                DiscountApplication::Shipping => {
                    let amount = evaluate(&discount, shipping, now)?;
                    allocations.push((discount.id.clone(), None, amount));
                }
            }
        }

        let total_discounts: Money = allocations.iter().map(|(_, _, amount)| *amount).sum();
        let total_tax: Money = lines
            .iter()
            .map(|l| Money::from_cents(l.unit_tax_cents).multiply_quantity(l.quantity))
            .sum();
        let total = (subtotal - total_discounts + total_tax + shipping)
            .clamp(Money::zero(), Money::from_cents(i64::MAX));
        let total_weight: i64 = items.iter().map(|i| i.grams * i.quantity).sum();

        // Step 6: the order row (FK parent of lines/addresses/allocations).
        let order = Order {
            id: order_id.clone(),
            cart_id: cart_id.to_string(),
            customer_id,
            status: OrderStatus::Pending,
            currency: request.currency.clone(),
            location_id: request.location_id.clone(),
            subtotal_cents: subtotal.cents(),
            total_discounts_cents: total_discounts.cents(),
            total_tax_cents: total_tax.cents(),
            shipping_cents: shipping.cents(),
            total_cents: total.cents(),
            total_weight,
            weight_unit: WeightUnit::G,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, cart_id, customer_id, status, currency, location_id,
                subtotal_cents, total_discounts_cents, total_tax_cents,
                shipping_cents, total_cents, total_weight, weight_unit,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&order.id)
        .bind(&order.cart_id)
        .bind(&order.customer_id)
        .bind(order.status)
        .bind(&order.currency)
        .bind(&order.location_id)
        .bind(order.subtotal_cents)
        .bind(order.total_discounts_cents)
        .bind(order.total_tax_cents)
        .bind(order.shipping_cents)
        .bind(order.total_cents)
        .bind(order.total_weight)
        .bind(order.weight_unit)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        // Step 7: line item snapshots, frozen from the variants read above.
        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO line_items (
                    id, order_id, variant_id, title, sku,
                    unit_price_cents, unit_tax_cents, quantity,
                    discount_cents, total_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&line.id)
            .bind(&line.order_id)
            .bind(&line.variant_id)
            .bind(&line.title)
            .bind(&line.sku)
            .bind(line.unit_price_cents)
            .bind(line.unit_tax_cents)
            .bind(line.quantity)
            .bind(line.discount_cents)
            .bind(line.total_cents)
            .bind(line.created_at)
            .execute(&mut *tx)
            .await?;
        }

        // Step 8: address snapshots, copied by value and never updated.
        insert_address(&mut tx, &order_id, AddressKind::Billing, &request.billing, now).await?;
        if let Some(shipping_address) = &request.shipping {
            insert_address(&mut tx, &order_id, AddressKind::Shipping, shipping_address, now)
                .await?;
        }

        // Step 9: append-only allocation rows.
        for (discount_id, line_item_id, amount) in &allocations {
            sqlx::query(
                r#"
                INSERT INTO discount_allocations (
                    id, discount_id, order_id, line_item_id, amount_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(discount_id)
            .bind(&order_id)
            .bind(line_item_id)
            .bind(amount.cents())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // Step 10: flip the cart as the final act of the same transaction.
        // Zero rows means a concurrent checkout won; roll everything back.
        let flipped = sqlx::query(
            r#"
            UPDATE carts SET status = 'ORDERED', updated_at = ?2
            WHERE id = ?1 AND status = 'OPEN'
            "#,
        )
        .bind(cart_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() == 0 {
            return Err(DbError::Core(CoreError::CartAlreadyOrdered {
                cart_id: cart_id.to_string(),
            }));
        }

        tx.commit().await?;

        info!(
            cart_id = %cart_id,
            order_id = %order.id,
            total = %order.total(),
            lines = lines.len(),
            "Checkout complete"
        );

        Ok(order)
    }
}

/// Inserts one immutable address snapshot row.
async fn insert_address(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order_id: &str,
    kind: AddressKind,
    address: &AddressSnapshot,
    now: chrono::DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_addresses (
            id, order_id, kind, first_name, last_name,
            line1, line2, city, region, postal_code, country, phone,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(order_id)
    .bind(kind)
    .bind(&address.first_name)
    .bind(&address.last_name)
    .bind(&address.line1)
    .bind(&address.line2)
    .bind(&address.city)
    .bind(&address.region)
    .bind(&address.postal_code)
    .bind(&address.country)
    .bind(&address.phone)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
