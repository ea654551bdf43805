//! # storefront-db: Storage Layer for the Commerce Core
//!
//! This crate provides database access for the storefront transactional
//! core. It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Storefront Data Flow                                │
//! │                                                                         │
//! │  Caller (API handler, worker, test)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  storefront-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (cart.rs ...) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ CartRepo      │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │◄───│ CheckoutRepo  │    │              │  │   │
//! │  │   │ Management    │    │ PaymentRepo   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │        WAL mode, foreign keys on, bounded busy_timeout          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (cart, checkout, etc.)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storefront_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/storefront.db")).await?;
//!
//! let cart = db.carts().create_cart(None).await?;
//! db.carts().add_item(&cart.id, &variant_id, 2).await?;
//! let order = db.checkout().checkout(&cart.id, request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::catalog::CatalogRepository;
pub use repository::checkout::{CheckoutRepository, CheckoutRequest, LineTax};
pub use repository::discount::DiscountRepository;
pub use repository::fulfillment::{FulfillmentRepository, LineAllocation};
pub use repository::inventory::InventoryRepository;
pub use repository::order::OrderRepository;
pub use repository::payment::{PaymentRecord, PaymentRepository};
