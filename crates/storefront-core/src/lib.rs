//! # storefront-core: Pure Business Logic for the Commerce Core
//!
//! This crate is the **heart** of the commerce transactional core. It
//! contains all business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Storefront Commerce Core Architecture                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Callers (API surface, out of scope)                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ storefront-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ discount  │  │ validation│  │   │
//! │  │   │ Cart/Order│  │   Money   │  │ evaluate  │  │   rules   │  │   │
//! │  │   │ Ledger    │  │ bps math  │  │  windows  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                storefront-db (Database Layer)                   │   │
//! │  │       SQLite transactions: carts, checkout, inventory,          │   │
//! │  │       payments, fulfillments, refunds                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Cart, Order, LineItem, PaymentTransaction, …)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`discount`] - Pure discount evaluation
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input =
//!    same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid
//!    float errors
//! 4. **Closed State Machines**: Statuses are exhaustively-matched enums,
//!    never free-form strings

// =============================================================================
// Module Declarations
// =============================================================================

pub mod discount;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use storefront_core::Money` instead of
// `use storefront_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default stock location for single-location merchants.
///
/// ## Why a constant?
/// Inventory is keyed by (variant, location) for multi-location support,
/// but a single-merchant deployment usually runs one location. Callers that
/// don't manage locations use this one.
pub const DEFAULT_LOCATION_ID: &str = "default";

/// Default order currency for seeding and tests.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Maximum quantity of a single item in a cart line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;
