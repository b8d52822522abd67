//! Core data model: `PaymentIntent`, `Payment`, `StatusHistory`, and the
//! read-only views returned from `CheckOrder`/`Get`.
//!
//! Storage shape is JSONB-blob-plus-projected-columns (`intent_blob`,
//! indexed `merchant_key`/`order_id`/`status`/`amount`/`currency`), the
//! same `data JSONB NOT NULL` + projection-column idiom the cache schema
//! uses elsewhere in this crate.

use crate::state_machine::PaymentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayType {
    SingleStage,
    TwoStage,
}

impl Default for PayType {
    fn default() -> Self {
        PayType::SingleStage
    }
}

/// Input to `PaymentService::init`. Immutable once bound to a `Payment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub merchant_key: String,
    pub order_id: String,
    /// Positive integer amount in minor units (e.g. kopecks).
    pub amount: i64,
    /// ISO-4217, uppercase, 3 letters.
    pub currency: String,
    pub description: String,
    pub customer_key: Option<String>,
    #[serde(default)]
    pub pay_type: PayType,
    #[serde(default = "default_language")]
    pub language: String,
    pub success_url: Option<String>,
    pub fail_url: Option<String>,
    pub notification_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub receipt: Option<serde_json::Value>,
    pub items: Option<serde_json::Value>,
    pub shops: Option<serde_json::Value>,
    #[serde(default)]
    pub recurrent: bool,
    pub data: Option<serde_json::Value>,
}

fn default_language() -> String {
    "ru".to_string()
}

/// The persistent aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: String,
    pub intent: PaymentIntent,
    pub status: PaymentStatus,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
    pub bank_ref: Option<String>,
    pub card_fingerprint: Option<String>,
    /// Monotonic integer used for optimistic concurrency on every write.
    pub version: i64,
}

impl Payment {
    /// Whether the payment is no longer subject to any further state change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One entry in the append-only transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub payment_id: String,
    pub from_status: PaymentStatus,
    pub to_status: PaymentStatus,
    pub at: DateTime<Utc>,
    pub actor: Option<String>,
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub is_rollback: bool,
    pub rollback_from: Option<i64>,
}

/// A new transition to be appended; `id` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewStatusHistoryEntry {
    pub payment_id: String,
    pub from_status: PaymentStatus,
    pub to_status: PaymentStatus,
    pub at: DateTime<Utc>,
    pub actor: Option<String>,
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub is_rollback: bool,
    pub rollback_from: Option<i64>,
}

/// Summary row returned by `CheckOrder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub refunded_amount: Option<i64>,
    /// Truncated tail of the status history (most recent entries last).
    pub history_tail: Vec<StatusHistoryEntry>,
}

/// Point-in-time read returned by `Get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentView {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub bank_ref: Option<String>,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
}

impl From<&Payment> for PaymentView {
    fn from(p: &Payment) -> Self {
        PaymentView {
            payment_id: p.payment_id.clone(),
            status: p.status,
            amount: p.intent.amount,
            currency: p.intent.currency.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
            expires_at: p.expires_at,
            bank_ref: p.bank_ref.clone(),
            last_error_code: p.last_error_code.clone(),
            last_error_message: p.last_error_message.clone(),
        }
    }
}
