//! # Validation Module
//!
//! Input validation utilities for the commerce core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (API surface, out of scope here)                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation before any I/O        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (quantity > 0, enum sets)                       │
//! │  ├── UNIQUE constraints ((cart, variant), idempotency key)             │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  Defense in depth: multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Quantity Validators
// =============================================================================

/// Validates a cart/fulfillment/refund line quantity.
///
/// ## Rules
/// - Must be positive (zero-quantity updates are removals, not updates)
/// - Must not exceed the per-item maximum
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_quantity;
///
/// assert!(validate_quantity(3).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(-1).is_err());
/// ```
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a monetary amount supplied by a caller (payment amounts,
/// caller-provided tax/shipping figures).
///
/// Amounts are cents and must not be negative; refund reversals are modeled
/// by transaction kind, not by sign.
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates an ISO 4217 currency code.
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_currency;
///
/// assert!(validate_currency("USD").is_ok());
/// assert!(validate_currency("usd").is_err());
/// assert!(validate_currency("").is_err());
/// ```
pub fn validate_currency(currency: &str) -> ValidationResult<()> {
    if currency.is_empty() {
        return Err(ValidationError::Required {
            field: "currency".to_string(),
        });
    }

    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a 3-letter uppercase ISO 4217 code".to_string(),
        });
    }

    Ok(())
}

/// Validates a discount code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Uppercase letters, digits, hyphens, underscores only
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_discount_code;
///
/// assert!(validate_discount_code("SAVE10").is_ok());
/// assert!(validate_discount_code("").is_err());
/// assert!(validate_discount_code("save 10").is_err());
/// ```
pub fn validate_discount_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: 50,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only uppercase letters, digits, hyphens, and underscores"
                .to_string(),
        });
    }

    Ok(())
}

/// Validates an idempotency key supplied by a payment gateway.
pub fn validate_idempotency_key(key: &str) -> ValidationResult<()> {
    if key.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "idempotency_key".to_string(),
        });
    }

    if key.len() > 255 {
        return Err(ValidationError::TooLong {
            field: "idempotency_key".to_string(),
            max: 255,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
