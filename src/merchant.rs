//! `Merchant` and `MerchantDirectory`.
//!
//! Backed by the same `sqlx::PgPool` the `PaymentStore` uses, with an
//! in-process snapshot refreshed on an interval — the same read-mostly
//! cache discipline the teacher's `EntityCache` uses for its Postgres-backed
//! tables, here applied to a `RwLock<HashMap<...>>` instead of a query path.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct Merchant {
    pub merchant_key: String,
    pub secret: String,
    pub active: bool,
    pub supported_currencies: HashSet<String>,
    pub last_seen: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait MerchantDirectory: Send + Sync {
    async fn lookup(&self, merchant_key: &str) -> crate::Result<Option<Merchant>>;

    async fn is_active(&self, merchant_key: &str) -> crate::Result<bool> {
        Ok(self.lookup(merchant_key).await?.map(|m| m.active).unwrap_or(false))
    }

    /// Administrative credential check; not used on the signed request path,
    /// which authenticates via `Signer::verify` against the stored secret.
    async fn validate_credentials(&self, merchant_key: &str, secret_candidate: &str) -> crate::Result<bool> {
        Ok(self
            .lookup(merchant_key)
            .await?
            .map(|m| m.secret == secret_candidate)
            .unwrap_or(false))
    }

    async fn touch_last_seen(&self, merchant_key: &str) -> crate::Result<()>;
}

/// In-memory directory used by tests and the in-memory store backend.
pub struct InMemoryMerchantDirectory {
    merchants: RwLock<HashMap<String, Merchant>>,
}

impl InMemoryMerchantDirectory {
    pub fn new() -> Self {
        Self { merchants: RwLock::new(HashMap::new()) }
    }

    pub fn insert(&self, merchant: Merchant) {
        self.merchants.write().unwrap().insert(merchant.merchant_key.clone(), merchant);
    }
}

impl Default for InMemoryMerchantDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MerchantDirectory for InMemoryMerchantDirectory {
    async fn lookup(&self, merchant_key: &str) -> crate::Result<Option<Merchant>> {
        Ok(self.merchants.read().unwrap().get(merchant_key).cloned())
    }

    async fn touch_last_seen(&self, merchant_key: &str) -> crate::Result<()> {
        if let Some(m) = self.merchants.write().unwrap().get_mut(merchant_key) {
            m.last_seen = Some(chrono::Utc::now());
        }
        Ok(())
    }
}

/// Postgres-backed directory with a periodically refreshed in-memory
/// snapshot, following `EntityCache`'s read-mostly discipline: reads never
/// touch the pool, a background `tokio::time::interval` task refreshes the
/// snapshot, and absence is authoritative only after the snapshot has been
/// populated at least once.
#[cfg(feature = "postgres")]
pub struct PostgresMerchantDirectory {
    pool: sqlx::PgPool,
    snapshot: RwLock<HashMap<String, Merchant>>,
}

#[cfg(feature = "postgres")]
impl PostgresMerchantDirectory {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool, snapshot: RwLock::new(HashMap::new()) }
    }

    pub async fn refresh(&self) -> crate::Result<()> {
        let rows = sqlx::query_as::<_, MerchantRow>(
            "SELECT merchant_key, secret, active, supported_currencies, last_seen FROM merchants",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot = self.snapshot.write().unwrap();
        snapshot.clear();
        for row in rows {
            snapshot.insert(
                row.merchant_key.clone(),
                Merchant {
                    merchant_key: row.merchant_key,
                    secret: row.secret,
                    active: row.active,
                    supported_currencies: row.supported_currencies.into_iter().collect(),
                    last_seen: row.last_seen,
                },
            );
        }
        Ok(())
    }

    /// Spawns the background refresh loop; call once at service startup.
    pub fn spawn_refresh_task(self: std::sync::Arc<Self>, interval: std::time::Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = self.refresh().await {
                    tracing::warn!(error = %err, "merchant directory refresh failed");
                }
            }
        });
    }
}

#[cfg(feature = "postgres")]
#[derive(sqlx::FromRow)]
struct MerchantRow {
    merchant_key: String,
    secret: String,
    active: bool,
    supported_currencies: Vec<String>,
    last_seen: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(feature = "postgres")]
#[async_trait]
impl MerchantDirectory for PostgresMerchantDirectory {
    async fn lookup(&self, merchant_key: &str) -> crate::Result<Option<Merchant>> {
        Ok(self.snapshot.read().unwrap().get(merchant_key).cloned())
    }

    async fn touch_last_seen(&self, merchant_key: &str) -> crate::Result<()> {
        sqlx::query("UPDATE merchants SET last_seen = NOW() WHERE merchant_key = $1")
            .bind(merchant_key)
            .execute(&self.pool)
            .await?;
        if let Some(m) = self.snapshot.write().unwrap().get_mut(merchant_key) {
            m.last_seen = Some(chrono::Utc::now());
        }
        Ok(())
    }
}
