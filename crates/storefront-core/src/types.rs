//! # Domain Types
//!
//! Core domain types for the commerce transactional core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Mutable (pre-checkout)          Immutable (post-checkout)              │
//! │  ──────────────────────          ──────────────────────────             │
//! │  Cart        status OPEN    ──►  Order          status PENDING…         │
//! │  CartItem    qty > 0        ──►  LineItem       frozen title/sku/price  │
//! │  (Address Book, external)   ──►  OrderAddress   frozen BILLING/SHIPPING │
//! │                                  DiscountAllocation  append-only        │
//! │                                  PaymentTransaction  append-only ledger │
//! │                                                                         │
//! │  Counters                        Secondary state machines               │
//! │  ────────                        ────────────────────────               │
//! │  InventoryLevel  qty >= 0        Fulfillment(+lines), Refund(+lines)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business key where one exists: (cart_id, variant_id) for cart items,
//!   discount `code`, payment `idempotency_key`
//!
//! ## Enum Storage
//! Every status enum is a closed Rust enum stored as an uppercase string
//! (SCREAMING_SNAKE_CASE) so the state machines are exhaustively matched in
//! code while the storage boundary stays human-readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Cart
// =============================================================================

/// Lifecycle of a cart.
///
/// The only transition is OPEN → ORDERED, exactly once, performed by the
/// checkout transaction. There is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    /// Cart accepts item mutations.
    Open,
    /// Cart has been converted into an order; immutable history.
    Ordered,
}

impl Default for CartStatus {
    fn default() -> Self {
        CartStatus::Open
    }
}

/// A mutable pre-purchase container of selected items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Cart {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Owning customer, if known (guest carts have none).
    pub customer_id: Option<String>,

    /// OPEN or ORDERED. Guards every item mutation.
    pub status: CartStatus,

    pub created_at: DateTime<Utc>,

    /// Bumped by every mutation, including the checkout flip.
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Whether item mutations are currently permitted.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == CartStatus::Open
    }
}

/// One variant selection inside a cart.
///
/// Unique per (cart, variant): adding the same variant twice is rejected;
/// callers update the quantity instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CartItem {
    pub id: String,
    pub cart_id: String,
    pub variant_id: String,
    /// Always > 0; a zero-quantity update is a removal, not an update.
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Catalog collaborators (read-only from the core's perspective)
// =============================================================================

/// A priced catalog unit.
///
/// The catalog service owns variant lifecycle; the core only reads them to
/// snapshot title/sku/price at checkout time and to key inventory levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Variant {
    pub id: String,
    /// Display title copied onto line items at checkout.
    pub title: String,
    /// Stock Keeping Unit - business identifier.
    pub sku: String,
    /// Unit price in cents.
    pub price_cents: i64,
    /// Unit weight in grams; summed onto the order at checkout.
    pub grams: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    /// Returns the unit price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// Available quantity of a variant at a specific stock location.
///
/// Invariant: `quantity >= 0` at all times. Mutated exclusively by the
/// checkout/fulfillment/refund flows, never by direct cart operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryLevel {
    pub variant_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Order
// =============================================================================

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Initial status assigned by checkout.
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
    Archived,
}

impl OrderStatus {
    /// Storage/wire name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::OnHold => "ON_HOLD",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Archived => "ARCHIVED",
        }
    }

    /// Closed transition table for the order state machine.
    ///
    /// Terminal states (CANCELLED, REFUNDED, FAILED, ARCHIVED) only allow
    /// archival; everything else moves forward or on/off hold.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Processing | OnHold | Completed | Cancelled | Failed) => true,
            (Processing, OnHold | Completed | Cancelled | Failed) => true,
            (OnHold, Processing | Completed | Cancelled | Failed) => true,
            (Completed, Refunded | Archived) => true,
            (Cancelled | Refunded | Failed, Archived) => true,
            _ => false,
        }
    }

    /// States from which a cancellation (with inventory release) is allowed.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::OnHold
        )
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

/// Weight unit recorded on the order snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum WeightUnit {
    G,
    Kg,
    Lb,
    Oz,
}

/// An immutable business snapshot created exactly once per cart.
///
/// ## Snapshot Pattern
/// Money totals, weight, line items, and addresses are frozen at checkout
/// time. Later catalog or address-book edits never retroactively change a
/// historical order; only `status`/`updated_at` move afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    /// Unique back-reference enforcing the 1:1 cart→order relationship.
    pub cart_id: String,
    pub customer_id: Option<String>,
    pub status: OrderStatus,
    /// ISO 4217 code, e.g. "USD".
    pub currency: String,
    /// Stock location the checkout reserved from. Cancellations and refund
    /// restocks release back here.
    pub location_id: String,
    pub subtotal_cents: i64,
    pub total_discounts_cents: i64,
    pub total_tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub total_weight: i64,
    pub weight_unit: WeightUnit,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn total_discounts(&self) -> Money {
        Money::from_cents(self.total_discounts_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an order address is the billing or the shipping one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressKind {
    Billing,
    Shipping,
}

/// Caller-supplied address values, copied (never referenced) at checkout.
///
/// The address book is an external collaborator; checkout takes the values
/// by copy so a customer editing their saved address later cannot change
/// what was billed or shipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

/// Immutable snapshot of a billing or shipping address, one row per
/// (order, kind); never updated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderAddress {
    pub id: String,
    pub order_id: String,
    pub kind: AddressKind,
    pub first_name: String,
    pub last_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable snapshot of one purchased variant within an order.
///
/// Title, sku and unit price are copied from the variant at checkout time
/// and decoupled from subsequent catalog edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LineItem {
    pub id: String,
    pub order_id: String,
    pub variant_id: String,
    /// Variant title at time of checkout (frozen).
    pub title: String,
    /// SKU at time of checkout (frozen).
    pub sku: String,
    /// Unit price in cents at time of checkout (frozen).
    pub unit_price_cents: i64,
    /// Per-unit tax in cents supplied by the caller (tax computation is
    /// out of scope for the core).
    pub unit_tax_cents: i64,
    /// Quantity ordered; fulfillment and refund lines are capped by it.
    pub quantity: i64,
    /// Total discount allocated against this line.
    pub discount_cents: i64,
    /// unit_price × quantity - discount.
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Discounts
// =============================================================================

/// What a discount applies against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountApplication {
    /// Once against the order subtotal.
    Order,
    /// Per eligible line item.
    LineItem,
    /// Against the shipping price only.
    Shipping,
}

/// How the discount amount is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountMethod {
    /// `value` is basis points (1000 = 10%).
    PercentOff,
    /// `value` is cents.
    FlatRate,
}

/// Administrative status of a discount rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountStatus {
    Active,
    Inactive,
    Scheduled,
    Expired,
}

/// A reusable discount rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Discount {
    pub id: String,
    /// Customer-facing code, unique, uppercase (e.g. "SAVE10").
    pub code: String,
    pub application: DiscountApplication,
    pub method: DiscountMethod,
    /// Basis points for PERCENT_OFF (1000 = 10%, not a 0-100 percentage),
    /// cents for FLAT_RATE.
    pub value: i64,
    pub status: DiscountStatus,
    /// Validity window; None bounds are unbounded.
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The realized monetary effect of a Discount against an Order or a
/// LineItem. Append-only: never mutated after creation; corrections are new
/// reversing entries at a higher layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DiscountAllocation {
    pub id: String,
    pub discount_id: String,
    pub order_id: String,
    /// Set for LINE_ITEM-scoped allocations, None for ORDER/SHIPPING scope.
    pub line_item_id: Option<String>,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl DiscountAllocation {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Payment Ledger
// =============================================================================

/// Gateway operation recorded by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Authorization,
    Sale,
    Capture,
    Refund,
    Void,
}

/// Outcome of a payment attempt as last reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failure,
    Error,
}

/// One recorded payment attempt against an order.
///
/// The ledger is append-only. When an `idempotency_key` is present it is
/// globally unique across all transactions: a replayed gateway event lands
/// on the existing row instead of inserting a duplicate, and provider
/// follow-up callbacks update the status of that same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentTransaction {
    pub id: String,
    pub order_id: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount_cents: i64,
    pub currency: String,
    /// Gateway-supplied token ensuring at-most-once application.
    pub idempotency_key: Option<String>,
    /// Raw provider payload as JSON text, kept for audit.
    pub raw_payload: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Fulfillment / Refund Trackers
// =============================================================================

/// Status shared by the two secondary state machines.
///
/// They mirror the order lifecycle but are tracked independently per
/// fulfillment/refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl TrackerStatus {
    /// Forward-only transitions; CANCELLED and COMPLETED are terminal.
    pub fn can_transition_to(self, next: TrackerStatus) -> bool {
        use TrackerStatus::*;
        match (self, next) {
            (Pending, Processing | Completed | Cancelled) => true,
            (Processing, Completed | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TrackerStatus::Pending => "PENDING",
            TrackerStatus::Processing => "PROCESSING",
            TrackerStatus::Completed => "COMPLETED",
            TrackerStatus::Cancelled => "CANCELLED",
        })
    }
}

impl Default for TrackerStatus {
    fn default() -> Self {
        TrackerStatus::Pending
    }
}

/// A (possibly partial) shipment of an order's line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Fulfillment {
    pub id: String,
    pub order_id: String,
    pub status: TrackerStatus,
    /// Carrier tracking reference, if any.
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Quantity of one line item covered by a fulfillment. Always positive;
/// the per-line-item sum over non-cancelled fulfillments never exceeds the
/// ordered quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FulfillmentLine {
    pub id: String,
    pub fulfillment_id: String,
    pub line_item_id: String,
    pub quantity: i64,
}

/// A (possibly partial) refund against an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Refund {
    pub id: String,
    pub order_id: String,
    pub status: TrackerStatus,
    pub amount_cents: i64,
    pub reason: Option<String>,
    /// Whether the refund released its line quantities back to stock when
    /// it was created.
    pub restocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Quantity of one line item covered by a refund. Same cap rules as
/// fulfillment lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RefundLine {
    pub id: String,
    pub refund_id: String,
    pub line_item_id: String,
    pub quantity: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_status_default() {
        assert_eq!(CartStatus::default(), CartStatus::Open);
    }

    #[test]
    fn test_order_transitions_forward() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Completed.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn test_order_transitions_rejected() {
        // No way back from terminal states except archival
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Archived.can_transition_to(OrderStatus::Pending));
        assert!(OrderStatus::Cancelled.can_transition_to(OrderStatus::Archived));
    }

    #[test]
    fn test_cancellable_states() {
        assert!(OrderStatus::Pending.is_cancellable());
        assert!(OrderStatus::OnHold.is_cancellable());
        assert!(!OrderStatus::Completed.is_cancellable());
        assert!(!OrderStatus::Refunded.is_cancellable());
    }

    #[test]
    fn test_tracker_transitions() {
        assert!(TrackerStatus::Pending.can_transition_to(TrackerStatus::Processing));
        assert!(TrackerStatus::Processing.can_transition_to(TrackerStatus::Completed));
        assert!(!TrackerStatus::Completed.can_transition_to(TrackerStatus::Pending));
        assert!(!TrackerStatus::Cancelled.can_transition_to(TrackerStatus::Processing));
    }

    #[test]
    fn test_enum_storage_names_uppercase() {
        // The storage boundary normalizes enum values to uppercase
        assert_eq!(
            serde_json::to_string(&OrderStatus::OnHold).unwrap(),
            "\"ON_HOLD\""
        );
        assert_eq!(
            serde_json::to_string(&DiscountMethod::PercentOff).unwrap(),
            "\"PERCENT_OFF\""
        );
        assert_eq!(serde_json::to_string(&WeightUnit::Kg).unwrap(), "\"KG\"");
    }
}
