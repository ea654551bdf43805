//! # Discount Evaluator
//!
//! Pure evaluation of a discount rule against a base amount.
//!
//! ## Evaluation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Discount Evaluation                                  │
//! │                                                                         │
//! │  evaluate(discount, base, now)                                          │
//! │       │                                                                 │
//! │       ├── status != ACTIVE ──────────────► Err(DiscountNotActive)      │
//! │       ├── now < starts_at ───────────────► Err(DiscountNotActive)      │
//! │       ├── now > ends_at ─────────────────► Err(DiscountNotActive)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PERCENT_OFF: round(base × value / 10000), clamped to [0, base]        │
//! │  FLAT_RATE:   min(value, base), clamped at zero                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Ok(allocated)  ← recorded as an append-only DiscountAllocation        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Which base amount to pass is the orchestrator's job: the order subtotal
//! for ORDER scope, each eligible line total for LINE_ITEM scope, and the
//! shipping price for SHIPPING scope. Re-evaluating a discount never
//! mutates prior allocations; corrections are new reversing entries at a
//! higher layer.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Discount, DiscountMethod, DiscountStatus};

/// Computes the allocated amount for a discount against a base amount.
///
/// ## Errors
/// `DiscountNotActive` if `discount.status != ACTIVE` or `now` is outside
/// the `[starts_at, ends_at]` window (open-ended bounds are unbounded).
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use storefront_core::discount::evaluate;
/// use storefront_core::money::Money;
/// use storefront_core::types::{Discount, DiscountApplication, DiscountMethod, DiscountStatus};
///
/// let save10 = Discount {
///     id: "d-1".into(),
///     code: "SAVE10".into(),
///     application: DiscountApplication::Order,
///     method: DiscountMethod::PercentOff,
///     value: 1000, // 10%
///     status: DiscountStatus::Active,
///     starts_at: None,
///     ends_at: None,
///     created_at: Utc::now(),
///     updated_at: Utc::now(),
/// };
///
/// let allocated = evaluate(&save10, Money::from_cents(3000), Utc::now()).unwrap();
/// assert_eq!(allocated.cents(), 300); // 3.00 off a 30.00 subtotal
/// ```
pub fn evaluate(discount: &Discount, base: Money, now: DateTime<Utc>) -> CoreResult<Money> {
    if !is_applicable(discount, now) {
        return Err(CoreError::DiscountNotActive {
            code: discount.code.clone(),
        });
    }

    let allocated = match discount.method {
        // value is basis points; round half-up, never exceed the base
        DiscountMethod::PercentOff => base.percent_bps(discount.value.max(0) as u32),
        // value is cents; a flat discount never exceeds the base
        DiscountMethod::FlatRate => Money::from_cents(discount.value).min(base),
    };

    Ok(allocated.clamp(Money::zero(), base))
}

/// Whether the discount is ACTIVE and inside its validity window at `now`.
fn is_applicable(discount: &Discount, now: DateTime<Utc>) -> bool {
    if discount.status != DiscountStatus::Active {
        return false;
    }
    if let Some(starts_at) = discount.starts_at {
        if now < starts_at {
            return false;
        }
    }
    if let Some(ends_at) = discount.ends_at {
        if now > ends_at {
            return false;
        }
    }
    true
}

// =============================================================================
// Unit Tests
// =============================================================================
