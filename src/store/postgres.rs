//! Postgres-backed `PaymentStore`.
//!
//! `create_if_absent` relies on the partial unique index from `schema.rs`
//! (`ON CONFLICT DO NOTHING`); `update_conditional` is a single
//! `UPDATE ... SET version = version + 1 WHERE payment_id = $1 AND version =
//! $2` whose affected-row count tells us whether the compare-and-swap won,
//! with the history append issued inside the same transaction — the same
//! `pool.begin()` / statements / `tx.commit()` shape used by the hackload
//! reference file's `process_successful_payment`.

use super::{CasOutcome, CreateOutcome, PaymentStore};
use crate::payment::{NewStatusHistoryEntry, Payment, PaymentIntent, StatusHistoryEntry};
use crate::state_machine::PaymentStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;

pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_payment(row: &sqlx::postgres::PgRow) -> crate::Result<Payment> {
    let status_text: String = row.try_get("status")?;
    let status = PaymentStatus::from_str(&status_text).map_err(crate::Error::Internal)?;
    let intent_blob: serde_json::Value = row.try_get("intent_blob")?;
    let intent: PaymentIntent = serde_json::from_value(intent_blob)?;

    Ok(Payment {
        payment_id: row.try_get("payment_id")?,
        intent,
        status,
        attempt_count: row.try_get::<i32, _>("attempt_count")? as u32,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        expires_at: row.try_get("expires_at")?,
        last_error_code: row.try_get("last_error_code")?,
        last_error_message: row.try_get("last_error_message")?,
        bank_ref: row.try_get("bank_ref")?,
        card_fingerprint: row.try_get("card_fingerprint")?,
        version: row.try_get("version")?,
    })
}

fn row_to_history(row: &sqlx::postgres::PgRow) -> crate::Result<StatusHistoryEntry> {
    let from_text: String = row.try_get("from_status")?;
    let to_text: String = row.try_get("to_status")?;
    Ok(StatusHistoryEntry {
        id: row.try_get("id")?,
        payment_id: row.try_get("payment_id")?,
        from_status: PaymentStatus::from_str(&from_text).map_err(crate::Error::Internal)?,
        to_status: PaymentStatus::from_str(&to_text).map_err(crate::Error::Internal)?,
        at: row.try_get("at")?,
        actor: row.try_get("actor")?,
        error_code: row.try_get("error_code")?,
        message: row.try_get("message")?,
        is_rollback: row.try_get("is_rollback")?,
        rollback_from: row.try_get("rollback_from")?,
    })
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn get_by_id(&self, payment_id: &str) -> crate::Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    async fn get_by_order_id(&self, merchant_key: &str, order_id: &str) -> crate::Result<Option<Payment>> {
        let row = sqlx::query(
            "SELECT * FROM payments WHERE merchant_key = $1 AND order_id = $2 \
             AND status NOT IN ('DEADLINE_EXPIRED', 'CANCELLED', 'REJECTED') LIMIT 1",
        )
        .bind(merchant_key)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    async fn create_if_absent(&self, payment: Payment) -> crate::Result<CreateOutcome> {
        let intent_blob = serde_json::to_value(&payment.intent)?;
        let row = sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, merchant_key, order_id, status, amount, currency,
                attempt_count, bank_ref, card_fingerprint, last_error_code,
                last_error_message, version, intent_blob, created_at, updated_at, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (merchant_key, order_id) WHERE status NOT IN ('DEADLINE_EXPIRED', 'CANCELLED', 'REJECTED')
            DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&payment.payment_id)
        .bind(&payment.intent.merchant_key)
        .bind(&payment.intent.order_id)
        .bind(payment.status.to_string())
        .bind(payment.intent.amount)
        .bind(&payment.intent.currency)
        .bind(payment.attempt_count as i32)
        .bind(&payment.bank_ref)
        .bind(&payment.card_fingerprint)
        .bind(&payment.last_error_code)
        .bind(&payment.last_error_message)
        .bind(payment.version)
        .bind(intent_blob)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .bind(payment.expires_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(_) => Ok(CreateOutcome::Created(payment)),
            None => {
                let existing = self
                    .get_by_order_id(&payment.intent.merchant_key, &payment.intent.order_id)
                    .await?
                    .ok_or_else(|| crate::Error::Internal("conflicting insert vanished".to_string()))?;
                Ok(CreateOutcome::AlreadyExists(existing))
            }
        }
    }

    async fn update_conditional(
        &self,
        payment: &Payment,
        expected_version: i64,
        history: NewStatusHistoryEntry,
    ) -> crate::Result<CasOutcome> {
        let mut tx = self.pool.begin().await?;
        let intent_blob = serde_json::to_value(&payment.intent)?;

        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $1, attempt_count = $2, bank_ref = $3, card_fingerprint = $4,
                last_error_code = $5, last_error_message = $6, intent_blob = $7,
                updated_at = $8, expires_at = $9, version = version + 1
            WHERE payment_id = $10 AND version = $11
            "#,
        )
        .bind(payment.status.to_string())
        .bind(payment.attempt_count as i32)
        .bind(&payment.bank_ref)
        .bind(&payment.card_fingerprint)
        .bind(&payment.last_error_code)
        .bind(&payment.last_error_message)
        .bind(intent_blob)
        .bind(payment.updated_at)
        .bind(payment.expires_at)
        .bind(&payment.payment_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CasOutcome::VersionMismatch);
        }

        sqlx::query(
            r#"
            INSERT INTO status_history (payment_id, from_status, to_status, at, actor, error_code, message, is_rollback, rollback_from)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&history.payment_id)
        .bind(history.from_status.to_string())
        .bind(history.to_status.to_string())
        .bind(history.at)
        .bind(&history.actor)
        .bind(&history.error_code)
        .bind(&history.message)
        .bind(history.is_rollback)
        .bind(history.rollback_from)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CasOutcome::Applied)
    }

    async fn append_history(&self, entry: NewStatusHistoryEntry) -> crate::Result<StatusHistoryEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO status_history (payment_id, from_status, to_status, at, actor, error_code, message, is_rollback, rollback_from)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&entry.payment_id)
        .bind(entry.from_status.to_string())
        .bind(entry.to_status.to_string())
        .bind(entry.at)
        .bind(&entry.actor)
        .bind(&entry.error_code)
        .bind(&entry.message)
        .bind(entry.is_rollback)
        .bind(entry.rollback_from)
        .fetch_one(&self.pool)
        .await?;
        row_to_history(&row)
    }

    async fn history_for(&self, payment_id: &str) -> crate::Result<Vec<StatusHistoryEntry>> {
        let rows = sqlx::query("SELECT * FROM status_history WHERE payment_id = $1 ORDER BY at ASC")
            .bind(payment_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_history).collect()
    }

    async fn find_expired_since(&self, cutoff: DateTime<Utc>) -> crate::Result<Vec<Payment>> {
        let rows = sqlx::query(
            "SELECT * FROM payments WHERE expires_at < $1 \
             AND status NOT IN ('CANCELLED', 'DEADLINE_EXPIRED', 'REJECTED', 'REVERSED', 'PARTIAL_REVERSED', 'REFUNDED', 'PARTIAL_REFUNDED')",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_payment).collect()
    }

    async fn list_by_status(&self, status: PaymentStatus, limit: usize) -> crate::Result<Vec<Payment>> {
        let rows = sqlx::query("SELECT * FROM payments WHERE status = $1 LIMIT $2")
            .bind(status.to_string())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_payment).collect()
    }

    async fn list_by_order(&self, merchant_key: &str, order_id: &str) -> crate::Result<Vec<Payment>> {
        let rows = sqlx::query(
            "SELECT * FROM payments WHERE merchant_key = $1 AND order_id = $2 ORDER BY created_at ASC",
        )
        .bind(merchant_key)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_payment).collect()
    }
}
