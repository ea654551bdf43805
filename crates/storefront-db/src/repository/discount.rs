//! # Discount Repository
//!
//! Discount provisioning and lookups. Evaluation itself is pure and lives
//! in `storefront_core::discount`; checkout reads the row inside its own
//! transaction and runs the evaluator against the clock it captured.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use storefront_core::validation::validate_discount_code;
use storefront_core::{
    CoreError, Discount, DiscountApplication, DiscountMethod, DiscountStatus,
};

const DISCOUNT_COLUMNS: &str = r#"
    id, code, application, method, value, status,
    starts_at, ends_at, created_at, updated_at
"#;

/// Repository for discount provisioning and lookups.
#[derive(Debug, Clone)]
pub struct DiscountRepository {
    pool: SqlitePool,
}

impl DiscountRepository {
    /// Creates a new DiscountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DiscountRepository { pool }
    }

    /// Gets a discount by its customer-facing code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Discount>> {
        let discount = sqlx::query_as::<_, Discount>(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE code = ?1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(discount)
    }

    /// Inserts a discount.
    ///
    /// `value` is basis points for PERCENT_OFF (1000 = 10%) and cents for
    /// FLAT_RATE.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        code: &str,
        application: DiscountApplication,
        method: DiscountMethod,
        value: i64,
        status: DiscountStatus,
        starts_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
    ) -> DbResult<Discount> {
        validate_discount_code(code).map_err(CoreError::from)?;

        let now = Utc::now();
        let discount = Discount {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            application,
            method,
            value,
            status,
            starts_at,
            ends_at,
            created_at: now,
            updated_at: now,
        };

        debug!(code = %discount.code, "Inserting discount");

        sqlx::query(
            r#"
            INSERT INTO discounts (
                id, code, application, method, value, status,
                starts_at, ends_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&discount.id)
        .bind(&discount.code)
        .bind(discount.application)
        .bind(discount.method)
        .bind(discount.value)
        .bind(discount.status)
        .bind(discount.starts_at)
        .bind(discount.ends_at)
        .bind(discount.created_at)
        .bind(discount.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(discount)
    }

    /// Sets a discount's status (activation, deactivation, expiry sweep).
    pub async fn set_status(&self, code: &str, status: DiscountStatus) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE discounts SET status = ?2, updated_at = ?3
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .bind(status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Discount", code));
        }

        Ok(())
    }
}
