//! # Error Types
//!
//! Domain-specific error types for storefront-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storefront-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations (recoverable)         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  storefront-db errors (separate crate)                                  │
//! │  └── DbError          - Database operation failures, wraps CoreError   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (cart id, variant id, etc.) so the
//!    caller can decide whether to retry or abort
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant is recoverable by the caller: the failing operation rolled
/// back completely and left no partial state behind.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A mutation targeted a cart whose status is not OPEN.
    ///
    /// ## When This Occurs
    /// - Adding/updating/removing an item after checkout flipped the cart
    /// - Moving an item into a cart that is no longer OPEN
    #[error("Cart {cart_id} is not open")]
    CartNotOpen { cart_id: String },

    /// Checkout was called on a cart that already produced an order.
    ///
    /// This is the idempotent guard against double-submission: the second
    /// call is a complete no-op.
    #[error("Cart {cart_id} has already been ordered")]
    CartAlreadyOrdered { cart_id: String },

    /// A cart item for this (cart, variant) pair already exists.
    /// Callers must update the existing item's quantity instead.
    #[error("Variant {variant_id} is already in cart {cart_id}")]
    DuplicateVariant { cart_id: String, variant_id: String },

    /// Checkout was called on a cart with no items.
    #[error("Cart {cart_id} is empty")]
    EmptyCart { cart_id: String },

    /// An inventory reservation would drive the available quantity below
    /// zero.
    ///
    /// ## User Workflow
    /// ```text
    /// checkout (qty: 3 of V at L)
    ///      │
    ///      ▼
    /// reserve: available = 2
    ///      │
    ///      ▼
    /// InsufficientStock { variant_id: V, location_id: L, requested: 3 }
    ///      │
    ///      ▼
    /// caller re-checks stock or aborts; cart stays OPEN
    /// ```
    #[error("Insufficient stock for variant {variant_id} at {location_id}: requested {requested}")]
    InsufficientStock {
        variant_id: String,
        location_id: String,
        requested: i64,
    },

    /// The discount exists but is not applicable right now: status is not
    /// ACTIVE, or `now` falls outside its validity window.
    #[error("Discount {code} is not active")]
    DiscountNotActive { code: String },

    /// A referenced cart/order/variant/discount does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A fulfillment or refund line would push the allocated quantity for a
    /// line item past its ordered quantity.
    #[error(
        "Line item {line_item_id} over-allocated: ordered {ordered}, requested {requested} more"
    )]
    LineItemOverAllocated {
        line_item_id: String,
        ordered: i64,
        requested: i64,
    },

    /// An order status change violated the closed transition table.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidOrderTransition {
        order_id: String,
        from: String,
        to: String,
    },

    /// A fulfillment or refund status change violated the tracker
    /// transition table.
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTrackerTransition {
        entity: String,
        id: String,
        from: String,
        to: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when caller input doesn't meet requirements, before any
/// business logic or database work runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., bad currency code, bad discount code charset).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
