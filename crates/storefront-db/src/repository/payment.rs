//! # Payment Ledger
//!
//! Append-only record of gateway activity against orders.
//!
//! ## Idempotent Recording
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │            At-Most-Once via Partial Unique Index                        │
//! │                                                                         │
//! │  INSERT INTO payment_transactions (...)                                 │
//! │  ON CONFLICT (idempotency_key) WHERE idempotency_key IS NOT NULL        │
//! │  DO NOTHING                                                             │
//! │                                                                         │
//! │  rows_affected == 1 → this call recorded the event                      │
//! │  rows_affected == 0 → a previous call already did; read back and        │
//! │                       return the winner's row (no error, no duplicate)  │
//! │                                                                         │
//! │  Concurrent submissions of the same gateway event race on the unique    │
//! │  index instead of on application logic; exactly one row ever exists     │
//! │  per key. Rows without a key (manual entries) skip the dance.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are never deleted. Provider follow-up callbacks (an authorization
//! settling, a capture failing) update the status of the original row,
//! addressed by its idempotency key.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use storefront_core::validation::{
    validate_amount_cents, validate_currency, validate_idempotency_key,
};
use storefront_core::{CoreError, PaymentTransaction, TransactionKind, TransactionStatus};

const TRANSACTION_COLUMNS: &str = r#"
    id, order_id, kind, status, amount_cents, currency,
    idempotency_key, raw_payload, created_at, updated_at
"#;

/// What a caller hands the ledger to record one gateway event.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub order_id: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount_cents: i64,
    pub currency: String,
    /// Present for gateway events; None for manual entries.
    pub idempotency_key: Option<String>,
    /// Raw provider payload as JSON text.
    pub raw_payload: String,
}

/// Repository for the append-only payment ledger.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Records a payment event, at most once per idempotency key.
    ///
    /// A replay (same key) returns the previously recorded transaction
    /// unchanged; the caller cannot tell whether it won the race, and does
    /// not need to.
    pub async fn record(&self, record: PaymentRecord) -> DbResult<PaymentTransaction> {
        validate_amount_cents("amount_cents", record.amount_cents).map_err(CoreError::from)?;
        validate_currency(&record.currency).map_err(CoreError::from)?;
        if let Some(key) = &record.idempotency_key {
            validate_idempotency_key(key).map_err(CoreError::from)?;
        }

        debug!(
            order_id = %record.order_id,
            kind = ?record.kind,
            amount = record.amount_cents,
            "Recording payment transaction"
        );

        let mut tx = self.pool.begin().await?;

        // FK violations don't say which entity was missing; check up front
        let order_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM orders WHERE id = ?1")
            .bind(&record.order_id)
            .fetch_optional(&mut *tx)
            .await?;
        if order_exists.is_none() {
            return Err(DbError::not_found("Order", &record.order_id));
        }

        let now = Utc::now();
        let transaction = PaymentTransaction {
            id: Uuid::new_v4().to_string(),
            order_id: record.order_id.clone(),
            kind: record.kind,
            status: record.status,
            amount_cents: record.amount_cents,
            currency: record.currency.clone(),
            idempotency_key: record.idempotency_key.clone(),
            raw_payload: record.raw_payload.clone(),
            created_at: now,
            updated_at: now,
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, order_id, kind, status, amount_cents, currency,
                idempotency_key, raw_payload, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (idempotency_key) WHERE idempotency_key IS NOT NULL
            DO NOTHING
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.order_id)
        .bind(transaction.kind)
        .bind(transaction.status)
        .bind(transaction.amount_cents)
        .bind(&transaction.currency)
        .bind(&transaction.idempotency_key)
        .bind(&transaction.raw_payload)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            // Replay: a previous call with this key won. Hand back its row.
            let key = record.idempotency_key.as_deref().unwrap_or_default();
            let existing = sqlx::query_as::<_, PaymentTransaction>(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE idempotency_key = ?1"
            ))
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;

            info!(key = %key, transaction_id = %existing.id, "Payment replay, returning existing row");
            return Ok(existing);
        }

        tx.commit().await?;

        info!(
            transaction_id = %transaction.id,
            order_id = %transaction.order_id,
            "Payment transaction recorded"
        );

        Ok(transaction)
    }

    /// Updates the status of the transaction addressed by an idempotency
    /// key (provider follow-up callbacks).
    pub async fn update_status_by_key(
        &self,
        idempotency_key: &str,
        status: TransactionStatus,
        raw_payload: Option<&str>,
    ) -> DbResult<PaymentTransaction> {
        validate_idempotency_key(idempotency_key).map_err(CoreError::from)?;

        debug!(key = %idempotency_key, status = ?status, "Updating payment status");

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = ?2,
                raw_payload = COALESCE(?3, raw_payload),
                updated_at = ?4
            WHERE idempotency_key = ?1
            "#,
        )
        .bind(idempotency_key)
        .bind(status)
        .bind(raw_payload)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PaymentTransaction", idempotency_key));
        }

        let transaction = sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE idempotency_key = ?1"
        ))
        .bind(idempotency_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// Gets a transaction by its idempotency key.
    pub async fn get_by_key(&self, idempotency_key: &str) -> DbResult<Option<PaymentTransaction>> {
        let transaction = sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE idempotency_key = ?1"
        ))
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// Lists all transactions for an order, oldest first.
    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<PaymentTransaction>> {
        let transactions = sqlx::query_as::<_, PaymentTransaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM payment_transactions
            WHERE order_id = ?1
            ORDER BY created_at
            "#
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }
}
