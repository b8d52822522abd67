//! In-memory `PaymentStore`, used by unit tests and the `TestContext` in
//! the integration test suite. No `.await` point holds the lock, so the
//! compare-and-swap in `update_conditional` behaves atomically relative to
//! concurrent callers the same way a single SQL transaction would.

use super::{blocks_uniqueness, CasOutcome, CreateOutcome, PaymentStore};
use crate::payment::{NewStatusHistoryEntry, Payment, StatusHistoryEntry};
use crate::state_machine::PaymentStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    payments: HashMap<String, Payment>,
    history: Vec<StatusHistoryEntry>,
    next_history_id: i64,
}

pub struct InMemoryPaymentStore {
    inner: Mutex<Inner>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { next_history_id: 1, ..Default::default() }) }
    }
}

impl Default for InMemoryPaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn get_by_id(&self, payment_id: &str) -> crate::Result<Option<Payment>> {
        Ok(self.inner.lock().unwrap().payments.get(payment_id).cloned())
    }

    async fn get_by_order_id(&self, merchant_key: &str, order_id: &str) -> crate::Result<Option<Payment>> {
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .payments
            .values()
            .filter(|p| p.intent.merchant_key == merchant_key && p.intent.order_id == order_id)
            .find(|p| blocks_uniqueness(p.status))
            .cloned())
    }

    async fn create_if_absent(&self, payment: Payment) -> crate::Result<CreateOutcome> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(existing) = guard
            .payments
            .values()
            .find(|p| {
                p.intent.merchant_key == payment.intent.merchant_key
                    && p.intent.order_id == payment.intent.order_id
                    && blocks_uniqueness(p.status)
            })
            .cloned()
        {
            return Ok(CreateOutcome::AlreadyExists(existing));
        }
        guard.payments.insert(payment.payment_id.clone(), payment.clone());
        Ok(CreateOutcome::Created(payment))
    }

    async fn update_conditional(
        &self,
        payment: &Payment,
        expected_version: i64,
        history: NewStatusHistoryEntry,
    ) -> crate::Result<CasOutcome> {
        let mut guard = self.inner.lock().unwrap();
        let current_version = guard.payments.get(&payment.payment_id).map(|p| p.version);
        match current_version {
            Some(v) if v == expected_version => {
                guard.payments.insert(payment.payment_id.clone(), payment.clone());
                let id = guard.next_history_id;
                guard.next_history_id += 1;
                guard.history.push(StatusHistoryEntry {
                    id,
                    payment_id: history.payment_id,
                    from_status: history.from_status,
                    to_status: history.to_status,
                    at: history.at,
                    actor: history.actor,
                    error_code: history.error_code,
                    message: history.message,
                    is_rollback: history.is_rollback,
                    rollback_from: history.rollback_from,
                });
                Ok(CasOutcome::Applied)
            }
            Some(_) => Ok(CasOutcome::VersionMismatch),
            None => Err(crate::Error::Internal(format!("no such payment: {}", payment.payment_id))),
        }
    }

    async fn append_history(&self, entry: NewStatusHistoryEntry) -> crate::Result<StatusHistoryEntry> {
        let mut guard = self.inner.lock().unwrap();
        let id = guard.next_history_id;
        guard.next_history_id += 1;
        let row = StatusHistoryEntry {
            id,
            payment_id: entry.payment_id,
            from_status: entry.from_status,
            to_status: entry.to_status,
            at: entry.at,
            actor: entry.actor,
            error_code: entry.error_code,
            message: entry.message,
            is_rollback: entry.is_rollback,
            rollback_from: entry.rollback_from,
        };
        guard.history.push(row.clone());
        Ok(row)
    }

    async fn history_for(&self, payment_id: &str) -> crate::Result<Vec<StatusHistoryEntry>> {
        let guard = self.inner.lock().unwrap();
        Ok(guard.history.iter().filter(|h| h.payment_id == payment_id).cloned().collect())
    }

    async fn find_expired_since(&self, cutoff: DateTime<Utc>) -> crate::Result<Vec<Payment>> {
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .payments
            .values()
            .filter(|p| !p.is_terminal() && p.expires_at < cutoff)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: PaymentStatus, limit: usize) -> crate::Result<Vec<Payment>> {
        let guard = self.inner.lock().unwrap();
        Ok(guard.payments.values().filter(|p| p.status == status).take(limit).cloned().collect())
    }

    async fn list_by_order(&self, merchant_key: &str, order_id: &str) -> crate::Result<Vec<Payment>> {
        let guard = self.inner.lock().unwrap();
        let mut rows: Vec<Payment> = guard
            .payments
            .values()
            .filter(|p| p.intent.merchant_key == merchant_key && p.intent.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{PayType, PaymentIntent};

    fn intent() -> PaymentIntent {
        PaymentIntent {
            merchant_key: "m1".to_string(),
            order_id: "o1".to_string(),
            amount: 1000,
            currency: "RUB".to_string(),
            description: "test".to_string(),
            customer_key: None,
            pay_type: PayType::SingleStage,
            language: "ru".to_string(),
            success_url: None,
            fail_url: None,
            notification_url: None,
            expires_at: None,
            receipt: None,
            items: None,
            shops: None,
            recurrent: false,
            data: None,
        }
    }

    fn payment(id: &str) -> Payment {
        let now = Utc::now();
        Payment {
            payment_id: id.to_string(),
            intent: intent(),
            status: PaymentStatus::Init,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::hours(24),
            last_error_code: None,
            last_error_message: None,
            bank_ref: None,
            card_fingerprint: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn create_if_absent_blocks_duplicate_live_order() {
        let store = InMemoryPaymentStore::new();
        let p1 = store.create_if_absent(payment("p1")).await.unwrap();
        assert!(matches!(p1, CreateOutcome::Created(_)));

        let p2 = store.create_if_absent(payment("p2")).await.unwrap();
        match p2 {
            CreateOutcome::AlreadyExists(existing) => assert_eq!(existing.payment_id, "p1"),
            _ => panic!("expected AlreadyExists"),
        }
    }

    #[tokio::test]
    async fn create_if_absent_allows_new_order_after_terminal() {
        let store = InMemoryPaymentStore::new();
        let mut terminal = payment("p1");
        terminal.status = PaymentStatus::Cancelled;
        store.create_if_absent(terminal).await.unwrap();

        let p2 = store.create_if_absent(payment("p2")).await.unwrap();
        assert!(matches!(p2, CreateOutcome::Created(_)));
    }

    #[tokio::test]
    async fn update_conditional_detects_version_mismatch() {
        let store = InMemoryPaymentStore::new();
        store.create_if_absent(payment("p1")).await.unwrap();

        let mut updated = payment("p1");
        updated.version = 1;
        updated.status = PaymentStatus::New;
        let hist = NewStatusHistoryEntry {
            payment_id: "p1".to_string(),
            from_status: PaymentStatus::Init,
            to_status: PaymentStatus::New,
            at: Utc::now(),
            actor: None,
            error_code: None,
            message: None,
            is_rollback: false,
            rollback_from: None,
        };
        // stale expected_version
        let outcome = store.update_conditional(&updated, 5, hist).await.unwrap();
        assert_eq!(outcome, CasOutcome::VersionMismatch);
    }

    #[tokio::test]
    async fn concurrent_transitions_yield_exactly_one_success() {
        use std::sync::Arc;
        let store = Arc::new(InMemoryPaymentStore::new());
        store.create_if_absent(payment("p1")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut updated = payment("p1");
                updated.version = 1;
                updated.status = PaymentStatus::New;
                let hist = NewStatusHistoryEntry {
                    payment_id: "p1".to_string(),
                    from_status: PaymentStatus::Init,
                    to_status: PaymentStatus::New,
                    at: Utc::now(),
                    actor: None,
                    error_code: None,
                    message: None,
                    is_rollback: false,
                    rollback_from: None,
                };
                store.update_conditional(&updated, 0, hist).await.unwrap()
            }));
        }

        let mut applied = 0;
        let mut mismatched = 0;
        for h in handles {
            match h.await.unwrap() {
                CasOutcome::Applied => applied += 1,
                CasOutcome::VersionMismatch => mismatched += 1,
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(mismatched, 9);
    }
}
