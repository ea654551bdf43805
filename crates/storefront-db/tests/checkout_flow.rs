//! End-to-end flows against an in-memory database: cart lifecycle,
//! checkout atomicity, discounts, payments, fulfillments and refunds.

use storefront_core::{
    AddressSnapshot, CartStatus, CoreError, DiscountApplication, DiscountMethod, DiscountStatus,
    OrderStatus, TrackerStatus, TransactionKind, TransactionStatus, DEFAULT_CURRENCY,
    DEFAULT_LOCATION_ID,
};
use storefront_db::{
    CheckoutRequest, Database, DbConfig, DbError, LineAllocation, PaymentRecord,
};

async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

fn billing_address() -> AddressSnapshot {
    AddressSnapshot {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        line1: "12 Analytical Way".to_string(),
        line2: None,
        city: "London".to_string(),
        region: "LDN".to_string(),
        postal_code: "EC1A 1AA".to_string(),
        country: "GB".to_string(),
        phone: None,
    }
}

fn basic_request() -> CheckoutRequest {
    CheckoutRequest {
        billing: billing_address(),
        shipping: None,
        discount_codes: vec![],
        currency: DEFAULT_CURRENCY.to_string(),
        location_id: DEFAULT_LOCATION_ID.to_string(),
        shipping_cents: 0,
        line_taxes: vec![],
    }
}

/// Seeds one variant with stock and returns its id.
async fn seed_variant(db: &Database, sku: &str, price_cents: i64, stock: i64) -> String {
    let variant = db
        .catalog()
        .insert(&format!("Widget {sku}"), sku, price_cents, 250)
        .await
        .unwrap();
    db.inventory()
        .set_level(&variant.id, DEFAULT_LOCATION_ID, stock)
        .await
        .unwrap();
    variant.id
}

async fn stock_of(db: &Database, variant_id: &str) -> i64 {
    db.inventory()
        .get_level(variant_id, DEFAULT_LOCATION_ID)
        .await
        .unwrap()
        .unwrap()
        .quantity
}

fn is_core<F: Fn(&CoreError) -> bool>(err: &DbError, pred: F) -> bool {
    matches!(err, DbError::Core(core) if pred(core))
}

// =============================================================================
// Cart lifecycle
// =============================================================================

#[tokio::test]
async fn test_cart_add_update_remove() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 10).await;

    let cart = db.carts().create_cart(Some("cust-1")).await.unwrap();
    assert_eq!(cart.status, CartStatus::Open);

    let item = db.carts().add_item(&cart.id, &variant_id, 2).await.unwrap();
    assert_eq!(item.quantity, 2);

    db.carts().update_item(&item.id, 5).await.unwrap();
    let items = db.carts().get_items(&cart.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 5);

    db.carts().remove_item(&item.id).await.unwrap();
    assert!(db.carts().get_items(&cart.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_variant_rejected() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 10).await;
    let cart = db.carts().create_cart(None).await.unwrap();

    db.carts().add_item(&cart.id, &variant_id, 1).await.unwrap();
    let err = db.carts().add_item(&cart.id, &variant_id, 2).await.unwrap_err();

    assert!(is_core(&err, |c| matches!(c, CoreError::DuplicateVariant { .. })));
    // The original line is untouched
    let items = db.carts().get_items(&cart.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 1);
}

#[tokio::test]
async fn test_add_item_rejects_bad_quantity() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 10).await;
    let cart = db.carts().create_cart(None).await.unwrap();

    let err = db.carts().add_item(&cart.id, &variant_id, 0).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::Validation(_))));

    let err = db.carts().add_item(&cart.id, &variant_id, -3).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::Validation(_))));
}

#[tokio::test]
async fn test_add_item_unknown_variant_is_not_found() {
    let db = test_db().await;
    let cart = db.carts().create_cart(None).await.unwrap();

    let err = db.carts().add_item(&cart.id, "no-such-variant", 1).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_move_item_between_open_carts() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 10).await;
    let source = db.carts().create_cart(None).await.unwrap();
    let dest = db.carts().create_cart(None).await.unwrap();

    let item = db.carts().add_item(&source.id, &variant_id, 2).await.unwrap();
    db.carts().move_item(&item.id, &dest.id).await.unwrap();

    assert!(db.carts().get_items(&source.id).await.unwrap().is_empty());
    let moved = db.carts().get_items(&dest.id).await.unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].variant_id, variant_id);
}

#[tokio::test]
async fn test_move_item_into_duplicate_rejected() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 10).await;
    let source = db.carts().create_cart(None).await.unwrap();
    let dest = db.carts().create_cart(None).await.unwrap();

    let item = db.carts().add_item(&source.id, &variant_id, 2).await.unwrap();
    db.carts().add_item(&dest.id, &variant_id, 1).await.unwrap();

    let err = db.carts().move_item(&item.id, &dest.id).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::DuplicateVariant { .. })));

    // No partial move: both carts keep their original lines
    assert_eq!(db.carts().get_items(&source.id).await.unwrap().len(), 1);
    assert_eq!(db.carts().get_items(&dest.id).await.unwrap().len(), 1);
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_happy_path() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;
    let cart = db.carts().create_cart(Some("cust-1")).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, 3).await.unwrap();

    let order = db.checkout().checkout(&cart.id, basic_request()).await.unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.subtotal_cents, 3000);
    assert_eq!(order.total_cents, 3000);
    assert_eq!(order.customer_id.as_deref(), Some("cust-1"));

    // Stock went 5 -> 2, cart flipped to ORDERED
    assert_eq!(stock_of(&db, &variant_id).await, 2);
    let cart = db.carts().get_cart(&cart.id).await.unwrap().unwrap();
    assert_eq!(cart.status, CartStatus::Ordered);

    // Line snapshot carries the frozen variant data
    let lines = db.orders().get_line_items(&order.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].unit_price_cents, 1000);
    assert_eq!(lines[0].quantity, 3);
    assert_eq!(lines[0].sku, "W-1");

    // Billing address snapshot landed
    let addresses = db.orders().get_addresses(&order.id).await.unwrap();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].first_name, "Ada");
}

#[tokio::test]
async fn test_line_items_frozen_against_catalog_edits() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;
    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, 1).await.unwrap();

    let order = db.checkout().checkout(&cart.id, basic_request()).await.unwrap();

    // Reprice the variant after checkout
    sqlx::query("UPDATE variants SET price_cents = 9999, title = 'Renamed' WHERE id = ?1")
        .bind(&variant_id)
        .execute(db.pool())
        .await
        .unwrap();

    let lines = db.orders().get_line_items(&order.id).await.unwrap();
    assert_eq!(lines[0].unit_price_cents, 1000);
    assert_eq!(lines[0].title, "Widget W-1");
}

#[tokio::test]
async fn test_checkout_empty_cart() {
    let db = test_db().await;
    let cart = db.carts().create_cart(None).await.unwrap();

    let err = db.checkout().checkout(&cart.id, basic_request()).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::EmptyCart { .. })));

    // Cart is untouched and still usable
    let cart = db.carts().get_cart(&cart.id).await.unwrap().unwrap();
    assert_eq!(cart.status, CartStatus::Open);
}

#[tokio::test]
async fn test_checkout_insufficient_stock_rolls_back() {
    let db = test_db().await;
    let plentiful = seed_variant(&db, "W-1", 1000, 50).await;
    let scarce = seed_variant(&db, "W-2", 500, 1).await;
    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &plentiful, 2).await.unwrap();
    db.carts().add_item(&cart.id, &scarce, 3).await.unwrap();

    let err = db.checkout().checkout(&cart.id, basic_request()).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::InsufficientStock { .. })));

    // All-or-nothing: the plentiful reservation rolled back too
    assert_eq!(stock_of(&db, &plentiful).await, 50);
    assert_eq!(stock_of(&db, &scarce).await, 1);
    let cart = db.carts().get_cart(&cart.id).await.unwrap().unwrap();
    assert_eq!(cart.status, CartStatus::Open);
    assert!(db.orders().get_by_cart(&cart.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_competing_checkouts_share_limited_stock() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;

    let cart_a = db.carts().create_cart(None).await.unwrap();
    let cart_b = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart_a.id, &variant_id, 3).await.unwrap();
    db.carts().add_item(&cart_b.id, &variant_id, 3).await.unwrap();

    let checkout = db.checkout();
    let (first, second) = tokio::join!(
        checkout.checkout(&cart_a.id, basic_request()),
        checkout.checkout(&cart_b.id, basic_request()),
    );

    // Stock 5 covers one request for 3, not two
    assert_eq!(first.is_ok() as usize + second.is_ok() as usize, 1);
    let loser = if first.is_err() { first.unwrap_err() } else { second.unwrap_err() };
    assert!(is_core(&loser, |c| matches!(c, CoreError::InsufficientStock { .. })));

    // Exactly one reservation landed, never a negative quantity
    assert_eq!(stock_of(&db, &variant_id).await, 2);

    // The losing cart is untouched and can retry
    let loser_cart_id = if db.orders().get_by_cart(&cart_a.id).await.unwrap().is_some() {
        &cart_b.id
    } else {
        &cart_a.id
    };
    let loser_cart = db.carts().get_cart(loser_cart_id).await.unwrap().unwrap();
    assert_eq!(loser_cart.status, CartStatus::Open);
    assert!(db.orders().get_by_cart(loser_cart_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_double_checkout_is_idempotent_error() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;
    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, 2).await.unwrap();

    db.checkout().checkout(&cart.id, basic_request()).await.unwrap();
    let err = db.checkout().checkout(&cart.id, basic_request()).await.unwrap_err();

    assert!(is_core(&err, |c| matches!(c, CoreError::CartAlreadyOrdered { .. })));
    // Stock decremented exactly once, one order exists
    assert_eq!(stock_of(&db, &variant_id).await, 3);
    assert!(db.orders().get_by_cart(&cart.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_ordered_cart_rejects_mutations() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;
    let other = seed_variant(&db, "W-2", 500, 5).await;
    let cart = db.carts().create_cart(None).await.unwrap();
    let item = db.carts().add_item(&cart.id, &variant_id, 1).await.unwrap();

    db.checkout().checkout(&cart.id, basic_request()).await.unwrap();

    let err = db.carts().add_item(&cart.id, &other, 1).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::CartNotOpen { .. })));

    let err = db.carts().update_item(&item.id, 2).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::CartNotOpen { .. })));

    let err = db.carts().remove_item(&item.id).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::CartNotOpen { .. })));

    // Moving an item into the ordered cart fails the same way
    let open = db.carts().create_cart(None).await.unwrap();
    let open_item = db.carts().add_item(&open.id, &other, 1).await.unwrap();
    let err = db.carts().move_item(&open_item.id, &cart.id).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::CartNotOpen { .. })));
}

#[tokio::test]
async fn test_checkout_with_shipping_and_tax() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;
    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, 2).await.unwrap();

    let mut request = basic_request();
    request.shipping_cents = 599;
    request.line_taxes = vec![storefront_db::LineTax {
        variant_id: variant_id.clone(),
        unit_tax_cents: 80,
    }];

    let order = db.checkout().checkout(&cart.id, request).await.unwrap();

    assert_eq!(order.subtotal_cents, 2000);
    assert_eq!(order.total_tax_cents, 160);
    assert_eq!(order.shipping_cents, 599);
    assert_eq!(order.total_cents, 2000 + 160 + 599);

    let lines = db.orders().get_line_items(&order.id).await.unwrap();
    assert_eq!(lines[0].unit_tax_cents, 80);
}

// =============================================================================
// Discounts
// =============================================================================

async fn seed_discount(
    db: &Database,
    code: &str,
    application: DiscountApplication,
    method: DiscountMethod,
    value: i64,
    status: DiscountStatus,
) {
    db.discounts()
        .insert(code, application, method, value, status, None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_percent_discount_on_order() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;
    seed_discount(
        &db,
        "SAVE10",
        DiscountApplication::Order,
        DiscountMethod::PercentOff,
        1000,
        DiscountStatus::Active,
    )
    .await;

    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, 3).await.unwrap();

    let mut request = basic_request();
    request.discount_codes = vec!["SAVE10".to_string()];
    let order = db.checkout().checkout(&cart.id, request).await.unwrap();

    // 10% of 30.00 = 3.00
    assert_eq!(order.subtotal_cents, 3000);
    assert_eq!(order.total_discounts_cents, 300);
    assert_eq!(order.total_cents, 2700);

    let allocations = db.orders().get_allocations(&order.id).await.unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].amount_cents, 300);
    assert!(allocations[0].line_item_id.is_none());
}

#[tokio::test]
async fn test_flat_discount_clamped_to_subtotal() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 500, 5).await;
    seed_discount(
        &db,
        "BIGOFF",
        DiscountApplication::Order,
        DiscountMethod::FlatRate,
        10000,
        DiscountStatus::Active,
    )
    .await;

    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, 1).await.unwrap();

    let mut request = basic_request();
    request.discount_codes = vec!["BIGOFF".to_string()];
    let order = db.checkout().checkout(&cart.id, request).await.unwrap();

    // $100 code against a $5 order discounts exactly $5, never negative
    assert_eq!(order.total_discounts_cents, 500);
    assert_eq!(order.total_cents, 0);
}

#[tokio::test]
async fn test_line_item_discount_allocates_per_line() {
    let db = test_db().await;
    let a = seed_variant(&db, "W-1", 1000, 5).await;
    let b = seed_variant(&db, "W-2", 2000, 5).await;
    seed_discount(
        &db,
        "LINE5",
        DiscountApplication::LineItem,
        DiscountMethod::PercentOff,
        500,
        DiscountStatus::Active,
    )
    .await;

    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &a, 1).await.unwrap();
    db.carts().add_item(&cart.id, &b, 1).await.unwrap();

    let mut request = basic_request();
    request.discount_codes = vec!["LINE5".to_string()];
    let order = db.checkout().checkout(&cart.id, request).await.unwrap();

    // 5% of 10.00 and 5% of 20.00
    assert_eq!(order.total_discounts_cents, 50 + 100);
    assert_eq!(order.total_cents, 3000 - 150);

    let allocations = db.orders().get_allocations(&order.id).await.unwrap();
    assert_eq!(allocations.len(), 2);
    assert!(allocations.iter().all(|a| a.line_item_id.is_some()));

    let lines = db.orders().get_line_items(&order.id).await.unwrap();
    let total_line_discount: i64 = lines.iter().map(|l| l.discount_cents).sum();
    assert_eq!(total_line_discount, 150);
}

#[tokio::test]
async fn test_shipping_discount() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;
    seed_discount(
        &db,
        "FREESHIP",
        DiscountApplication::Shipping,
        DiscountMethod::PercentOff,
        10000,
        DiscountStatus::Active,
    )
    .await;

    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, 1).await.unwrap();

    let mut request = basic_request();
    request.shipping_cents = 799;
    request.discount_codes = vec!["FREESHIP".to_string()];
    let order = db.checkout().checkout(&cart.id, request).await.unwrap();

    assert_eq!(order.total_discounts_cents, 799);
    assert_eq!(order.total_cents, 1000);
}

#[tokio::test]
async fn test_inactive_discount_aborts_checkout() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;
    seed_discount(
        &db,
        "BYGONE",
        DiscountApplication::Order,
        DiscountMethod::PercentOff,
        1000,
        DiscountStatus::Expired,
    )
    .await;

    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, 1).await.unwrap();

    let mut request = basic_request();
    request.discount_codes = vec!["BYGONE".to_string()];
    let err = db.checkout().checkout(&cart.id, request).await.unwrap_err();

    assert!(is_core(&err, |c| matches!(c, CoreError::DiscountNotActive { .. })));
    // Everything rolled back
    assert_eq!(stock_of(&db, &variant_id).await, 5);
    let cart = db.carts().get_cart(&cart.id).await.unwrap().unwrap();
    assert_eq!(cart.status, CartStatus::Open);
}

#[tokio::test]
async fn test_unknown_discount_code() {
    let db = test_db().await;
    let variant_id = seed_variant(&db, "W-1", 1000, 5).await;
    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, 1).await.unwrap();

    let mut request = basic_request();
    request.discount_codes = vec!["NOPE".to_string()];
    let err = db.checkout().checkout(&cart.id, request).await.unwrap_err();

    assert!(is_core(&err, |c| matches!(c, CoreError::NotFound { .. })));
}

// =============================================================================
// Order lifecycle
// =============================================================================

async fn checked_out_order(db: &Database, stock: i64, qty: i64) -> (String, String) {
    let variant_id = seed_variant(db, "W-1", 1000, stock).await;
    let cart = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart.id, &variant_id, qty).await.unwrap();
    let order = db.checkout().checkout(&cart.id, basic_request()).await.unwrap();
    (order.id, variant_id)
}

#[tokio::test]
async fn test_order_status_transitions() {
    let db = test_db().await;
    let (order_id, _) = checked_out_order(&db, 5, 1).await;

    let order = db.orders().update_status(&order_id, OrderStatus::Processing).await.unwrap();
    assert_eq!(order.status, OrderStatus::Processing);

    let order = db.orders().update_status(&order_id, OrderStatus::Completed).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);

    // Completed cannot go back
    let err = db
        .orders()
        .update_status(&order_id, OrderStatus::Processing)
        .await
        .unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::InvalidOrderTransition { .. })));
}

#[tokio::test]
async fn test_cancel_releases_stock() {
    let db = test_db().await;
    let (order_id, variant_id) = checked_out_order(&db, 5, 3).await;
    assert_eq!(stock_of(&db, &variant_id).await, 2);

    let order = db.orders().cancel(&order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&db, &variant_id).await, 5);

    // Second cancel is rejected, stock not double-released
    let err = db.orders().cancel(&order_id).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::InvalidOrderTransition { .. })));
    assert_eq!(stock_of(&db, &variant_id).await, 5);
}

#[tokio::test]
async fn test_cancel_after_restocking_refund_releases_remainder_only() {
    let db = test_db().await;
    let (order_id, variant_id) = checked_out_order(&db, 5, 3).await;
    assert_eq!(stock_of(&db, &variant_id).await, 2);
    let line = &db.orders().get_line_items(&order_id).await.unwrap()[0];

    // Restocking refund for 2 of the 3 ordered units
    db.fulfillments()
        .create_refund(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 2 }],
            2000,
            None,
            true,
        )
        .await
        .unwrap();
    assert_eq!(stock_of(&db, &variant_id).await, 4);

    // Cancel releases only the remaining reserved unit; stock never
    // exceeds its pre-checkout level
    db.orders().cancel(&order_id).await.unwrap();
    assert_eq!(stock_of(&db, &variant_id).await, 5);
}

#[tokio::test]
async fn test_cancel_completed_order_rejected() {
    let db = test_db().await;
    let (order_id, variant_id) = checked_out_order(&db, 5, 2).await;

    db.orders().update_status(&order_id, OrderStatus::Completed).await.unwrap();
    let err = db.orders().cancel(&order_id).await.unwrap_err();

    assert!(is_core(&err, |c| matches!(c, CoreError::InvalidOrderTransition { .. })));
    assert_eq!(stock_of(&db, &variant_id).await, 3);
}

// =============================================================================
// Payments
// =============================================================================

fn sale_record(order_id: &str, key: Option<&str>) -> PaymentRecord {
    PaymentRecord {
        order_id: order_id.to_string(),
        kind: TransactionKind::Sale,
        status: TransactionStatus::Pending,
        amount_cents: 1000,
        currency: DEFAULT_CURRENCY.to_string(),
        idempotency_key: key.map(str::to_string),
        raw_payload: r#"{"gateway":"test"}"#.to_string(),
    }
}

#[tokio::test]
async fn test_payment_idempotent_replay() {
    let db = test_db().await;
    let (order_id, _) = checked_out_order(&db, 5, 1).await;

    let first = db.payments().record(sale_record(&order_id, Some("evt-1"))).await.unwrap();
    let replay = db.payments().record(sale_record(&order_id, Some("evt-1"))).await.unwrap();

    // The replay observes the winner's row, no duplicate
    assert_eq!(first.id, replay.id);
    let all = db.payments().list_for_order(&order_id).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_payment_without_key_always_inserts() {
    let db = test_db().await;
    let (order_id, _) = checked_out_order(&db, 5, 1).await;

    db.payments().record(sale_record(&order_id, None)).await.unwrap();
    db.payments().record(sale_record(&order_id, None)).await.unwrap();

    let all = db.payments().list_for_order(&order_id).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_payment_followup_updates_same_row() {
    let db = test_db().await;
    let (order_id, _) = checked_out_order(&db, 5, 1).await;

    let recorded = db.payments().record(sale_record(&order_id, Some("evt-1"))).await.unwrap();
    assert_eq!(recorded.status, TransactionStatus::Pending);

    let settled = db
        .payments()
        .update_status_by_key("evt-1", TransactionStatus::Success, Some(r#"{"settled":true}"#))
        .await
        .unwrap();

    assert_eq!(settled.id, recorded.id);
    assert_eq!(settled.status, TransactionStatus::Success);
    assert_eq!(settled.raw_payload, r#"{"settled":true}"#);
}

#[tokio::test]
async fn test_payment_unknown_order() {
    let db = test_db().await;
    let err = db.payments().record(sale_record("no-such-order", None)).await.unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::NotFound { .. })));
}

// =============================================================================
// Fulfillments and refunds
// =============================================================================

#[tokio::test]
async fn test_partial_fulfillment_then_over_allocation() {
    let db = test_db().await;
    let (order_id, _) = checked_out_order(&db, 10, 5).await;
    let line = &db.orders().get_line_items(&order_id).await.unwrap()[0];

    // Ship 3 of 5, then the remaining 2
    db.fulfillments()
        .create_fulfillment(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 3 }],
            Some("TRACK-1"),
        )
        .await
        .unwrap();
    db.fulfillments()
        .create_fulfillment(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 2 }],
            None,
        )
        .await
        .unwrap();

    // A sixth unit does not exist
    let err = db
        .fulfillments()
        .create_fulfillment(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 1 }],
            None,
        )
        .await
        .unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::LineItemOverAllocated { .. })));

    let fulfillments = db.fulfillments().list_fulfillments(&order_id).await.unwrap();
    assert_eq!(fulfillments.len(), 2);
}

#[tokio::test]
async fn test_cancelled_fulfillment_frees_quantity() {
    let db = test_db().await;
    let (order_id, _) = checked_out_order(&db, 10, 2).await;
    let line = &db.orders().get_line_items(&order_id).await.unwrap()[0];

    let fulfillment = db
        .fulfillments()
        .create_fulfillment(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 2 }],
            None,
        )
        .await
        .unwrap();

    db.fulfillments()
        .update_fulfillment_status(&fulfillment.id, TrackerStatus::Cancelled)
        .await
        .unwrap();

    // The cancelled fulfillment no longer counts against the cap
    db.fulfillments()
        .create_fulfillment(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 2 }],
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_tracker_transitions_forward_only() {
    let db = test_db().await;
    let (order_id, _) = checked_out_order(&db, 10, 1).await;
    let line = &db.orders().get_line_items(&order_id).await.unwrap()[0];

    let fulfillment = db
        .fulfillments()
        .create_fulfillment(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 1 }],
            None,
        )
        .await
        .unwrap();
    assert_eq!(fulfillment.status, TrackerStatus::Pending);

    db.fulfillments()
        .update_fulfillment_status(&fulfillment.id, TrackerStatus::Processing)
        .await
        .unwrap();
    db.fulfillments()
        .update_fulfillment_status(&fulfillment.id, TrackerStatus::Completed)
        .await
        .unwrap();

    let err = db
        .fulfillments()
        .update_fulfillment_status(&fulfillment.id, TrackerStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::InvalidTrackerTransition { .. })));
}

#[tokio::test]
async fn test_refund_with_restock() {
    let db = test_db().await;
    let (order_id, variant_id) = checked_out_order(&db, 5, 3).await;
    assert_eq!(stock_of(&db, &variant_id).await, 2);
    let line = &db.orders().get_line_items(&order_id).await.unwrap()[0];

    let refund = db
        .fulfillments()
        .create_refund(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 2 }],
            2000,
            Some("damaged in transit"),
            true,
        )
        .await
        .unwrap();

    assert_eq!(refund.amount_cents, 2000);
    assert_eq!(stock_of(&db, &variant_id).await, 4);

    let lines = db.fulfillments().get_refund_lines(&refund.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 2);
}

#[tokio::test]
async fn test_refund_over_allocation_rejected_atomically() {
    let db = test_db().await;
    let (order_id, variant_id) = checked_out_order(&db, 5, 2).await;
    let line = &db.orders().get_line_items(&order_id).await.unwrap()[0];

    db.fulfillments()
        .create_refund(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 2 }],
            2000,
            None,
            true,
        )
        .await
        .unwrap();
    assert_eq!(stock_of(&db, &variant_id).await, 5);

    // A third refunded unit would exceed the 2 ordered; no restock happens
    let err = db
        .fulfillments()
        .create_refund(
            &order_id,
            &[LineAllocation { line_item_id: line.id.clone(), quantity: 1 }],
            1000,
            None,
            true,
        )
        .await
        .unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::LineItemOverAllocated { .. })));
    assert_eq!(stock_of(&db, &variant_id).await, 5);
}

#[tokio::test]
async fn test_refund_line_must_belong_to_order() {
    let db = test_db().await;
    let (order_a, _) = checked_out_order(&db, 5, 1).await;

    let variant_b = seed_variant(&db, "W-9", 700, 5).await;
    let cart_b = db.carts().create_cart(None).await.unwrap();
    db.carts().add_item(&cart_b.id, &variant_b, 1).await.unwrap();
    let order_b = db.checkout().checkout(&cart_b.id, basic_request()).await.unwrap();
    let line_b = &db.orders().get_line_items(&order_b.id).await.unwrap()[0];

    let err = db
        .fulfillments()
        .create_refund(
            &order_a,
            &[LineAllocation { line_item_id: line_b.id.clone(), quantity: 1 }],
            700,
            None,
            false,
        )
        .await
        .unwrap_err();
    assert!(is_core(&err, |c| matches!(c, CoreError::NotFound { .. })));
}
