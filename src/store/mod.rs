//! `PaymentStore`: the persistence contract for payments and status history.
//!
//! `CreateIfAbsent` enforces the `(merchant_key, order_id)` uniqueness
//! invariant atomically; `UpdateConditional` is a compare-and-swap on
//! `version`. Every state transition is one `UpdateConditional` plus one
//! `AppendHistory` inside a single atomic unit of work (`pool.begin()` →
//! statements → `tx.commit()`).

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod schema;

use crate::payment::{NewStatusHistoryEntry, Payment, StatusHistoryEntry};
use crate::state_machine::PaymentStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of `update_conditional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    VersionMismatch,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get_by_id(&self, payment_id: &str) -> crate::Result<Option<Payment>>;

    async fn get_by_order_id(&self, merchant_key: &str, order_id: &str) -> crate::Result<Option<Payment>>;

    /// Inserts `payment` unless a live (non-terminal-by-uniqueness) payment
    /// already exists for its `(merchant_key, order_id)` pair, in which case
    /// the existing payment is returned instead of an error — the caller
    /// (`PaymentService::init`) turns that into `DUPLICATE_ORDER`.
    async fn create_if_absent(&self, payment: Payment) -> crate::Result<CreateOutcome>;

    /// Compare-and-swap on `version`. Also appends `history` in the same
    /// atomic unit if the swap succeeds.
    async fn update_conditional(
        &self,
        payment: &Payment,
        expected_version: i64,
        history: NewStatusHistoryEntry,
    ) -> crate::Result<CasOutcome>;

    async fn append_history(&self, entry: NewStatusHistoryEntry) -> crate::Result<StatusHistoryEntry>;

    async fn history_for(&self, payment_id: &str) -> crate::Result<Vec<StatusHistoryEntry>>;

    async fn find_expired_since(&self, cutoff: DateTime<Utc>) -> crate::Result<Vec<Payment>>;

    async fn list_by_status(&self, status: PaymentStatus, limit: usize) -> crate::Result<Vec<Payment>>;

    async fn list_by_order(&self, merchant_key: &str, order_id: &str) -> crate::Result<Vec<Payment>>;
}

#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Payment),
    AlreadyExists(Payment),
}

/// Statuses for which a live payment blocks a new `Init` on the same order,
/// per the §3 uniqueness invariant.
pub fn blocks_uniqueness(status: PaymentStatus) -> bool {
    !matches!(
        status,
        PaymentStatus::DeadlineExpired | PaymentStatus::Cancelled | PaymentStatus::Rejected
    )
}
