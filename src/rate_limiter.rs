//! Per-merchant outbound-call concurrency throttling for `BankClient`.
//!
//! `MerchantSemaphores` caps concurrent `BankClient` calls per merchant so
//! one noisy merchant can't starve the others. Implemented as
//! `Mutex<HashMap<MerchantKey, Arc<Semaphore>>>` rather than pulling in
//! `dashmap`, matching this crate's preference for `tokio`'s own sync
//! primitives.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Caps the number of concurrent `BankClient` calls in flight for a single
/// merchant. Semaphores are created lazily on first use and retained for
/// the process lifetime — merchants are a small, bounded set in practice.
pub struct MerchantSemaphores {
    per_merchant: std::sync::Mutex<HashMap<String, Arc<Semaphore>>>,
    permits: usize,
}

impl MerchantSemaphores {
    pub fn new(permits: usize) -> Self {
        Self { per_merchant: std::sync::Mutex::new(HashMap::new()), permits }
    }

    fn semaphore_for(&self, merchant_key: &str) -> Arc<Semaphore> {
        let mut guard = self.per_merchant.lock().unwrap();
        guard
            .entry(merchant_key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.permits)))
            .clone()
    }

    /// Acquire a permit for `merchant_key`, waiting if the merchant is
    /// already at its concurrency cap. The returned permit's lifetime is
    /// tied to the semaphore via `Arc`, so it can outlive this call.
    pub async fn acquire(&self, merchant_key: &str) -> OwnedMerchantPermit {
        let sem = self.semaphore_for(merchant_key);
        let permit = sem
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        OwnedMerchantPermit { _permit: permit }
    }
}

pub struct OwnedMerchantPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn merchant_semaphores_cap_concurrency_per_merchant() {
        let sems = Arc::new(MerchantSemaphores::new(2));
        let _p1 = sems.acquire("m1").await;
        let _p2 = sems.acquire("m1").await;

        let sems2 = sems.clone();
        let third = tokio::spawn(async move {
            tokio::time::timeout(Duration::from_millis(50), sems2.acquire("m1")).await
        });
        let result = third.await.unwrap();
        assert!(result.is_err(), "third acquire for the same merchant should have blocked");
    }

    #[tokio::test]
    async fn merchant_semaphores_are_independent_per_merchant() {
        let sems = MerchantSemaphores::new(1);
        let _p1 = sems.acquire("m1").await;
        let p2 = tokio::time::timeout(Duration::from_millis(20), sems.acquire("m2")).await;
        assert!(p2.is_ok(), "a different merchant should not be blocked by m1's permit");
    }
}
