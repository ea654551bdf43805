//! # Repository Module
//!
//! Database repository implementations for the storefront commerce core.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Caller (API handler, worker, test)                                     │
//! │       │                                                                 │
//! │       │  db.carts().add_item(&cart_id, &variant_id, 2)                 │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  CartRepository                                                        │
//! │  ├── create_cart(&self, customer_id)                                   │
//! │  ├── add_item(&self, cart_id, variant_id, qty)                         │
//! │  ├── update_item(&self, item_id, qty)                                  │
//! │  └── move_item(&self, item_id, dest_cart_id)                           │
//! │       │                                                                 │
//! │       │  SQL (guarded transactions)                                     │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Clean separation of concerns                                        │
//! │  • SQL is isolated in one place                                        │
//! │  • Transactional invariants live next to the statements enforcing them │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CartRepository`] - Cart and cart item mutations (OPEN carts only)
//! - [`CatalogRepository`] - Read-only variant lookups
//! - [`InventoryRepository`] - Atomic reserve/release counters
//! - [`CheckoutRepository`] - The atomic cart → order transition
//! - [`OrderRepository`] - Order reads, transitions, cancellation
//! - [`DiscountRepository`] - Discount provisioning
//! - [`PaymentRepository`] - Append-only, idempotent payment ledger
//! - [`FulfillmentRepository`] - Fulfillment and refund trackers
//!
//! [`CartRepository`]: cart::CartRepository
//! [`CatalogRepository`]: catalog::CatalogRepository
//! [`InventoryRepository`]: inventory::InventoryRepository
//! [`CheckoutRepository`]: checkout::CheckoutRepository
//! [`OrderRepository`]: order::OrderRepository
//! [`DiscountRepository`]: discount::DiscountRepository
//! [`PaymentRepository`]: payment::PaymentRepository
//! [`FulfillmentRepository`]: fulfillment::FulfillmentRepository

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod discount;
pub mod fulfillment;
pub mod inventory;
pub mod order;
pub mod payment;
