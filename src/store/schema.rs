//! Postgres schema for the payment store.
//!
//! `CREATE TABLE IF NOT EXISTS` plus a handful of `CREATE INDEX IF NOT
//! EXISTS` statements, applied once at service startup. The `intent_blob`
//! JSONB column plus indexed projection columns mirrors the same
//! `data JSONB NOT NULL` shape the cache schema uses elsewhere.

use sqlx::PgPool;

pub async fn ensure_schema(pool: &PgPool) -> crate::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS merchants (
            merchant_key TEXT PRIMARY KEY,
            secret TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            supported_currencies TEXT[] NOT NULL DEFAULT '{}',
            last_seen TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            payment_id TEXT PRIMARY KEY,
            merchant_key TEXT NOT NULL,
            order_id TEXT NOT NULL,
            status TEXT NOT NULL,
            amount BIGINT NOT NULL,
            currency TEXT NOT NULL,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            bank_ref TEXT,
            card_fingerprint TEXT,
            last_error_code TEXT,
            last_error_message TEXT,
            version BIGINT NOT NULL DEFAULT 0,
            intent_blob JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS payments_live_order_idx
        ON payments (merchant_key, order_id)
        WHERE status NOT IN ('DEADLINE_EXPIRED', 'CANCELLED', 'REJECTED')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS payments_status_idx ON payments (status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS payments_expires_at_idx ON payments (expires_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS status_history (
            id BIGSERIAL PRIMARY KEY,
            payment_id TEXT NOT NULL REFERENCES payments (payment_id),
            from_status TEXT NOT NULL,
            to_status TEXT NOT NULL,
            at TIMESTAMPTZ NOT NULL,
            actor TEXT,
            error_code TEXT,
            message TEXT,
            is_rollback BOOLEAN NOT NULL DEFAULT FALSE,
            rollback_from BIGINT,
            recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS status_history_payment_id_idx ON status_history (payment_id)")
        .execute(pool)
        .await?;

    Ok(())
}
