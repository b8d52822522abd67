//! Request/response envelopes for the `http` module, mirroring spec.md §6's
//! operation table.

use crate::payment::{PayType, PaymentSummary, PaymentView};
use crate::state_machine::PaymentStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub merchant_key: String,
    pub order_id: String,
    pub amount: i64,
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
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub receipt: Option<serde_json::Value>,
    pub items: Option<serde_json::Value>,
    pub shops: Option<serde_json::Value>,
    #[serde(default)]
    pub recurrent: bool,
    pub data: Option<serde_json::Value>,
    pub token: String,
}

fn default_language() -> String {
    "ru".to_string()
}

impl InitRequest {
    pub fn into_intent(self) -> crate::payment::PaymentIntent {
        crate::payment::PaymentIntent {
            merchant_key: self.merchant_key,
            order_id: self.order_id,
            amount: self.amount,
            currency: self.currency,
            description: self.description,
            customer_key: self.customer_key,
            pay_type: self.pay_type,
            language: self.language,
            success_url: self.success_url,
            fail_url: self.fail_url,
            notification_url: self.notification_url,
            expires_at: self.expires_at,
            receipt: self.receipt,
            items: self.items,
            shops: self.shops,
            recurrent: self.recurrent,
            data: self.data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub payment_url: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptCardRequest {
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
    pub holder: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptCardResponse {
    pub status: PaymentStatus,
    pub challenge_handle: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Submit3DSRequest {
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenOnlyRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub token: String,
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: PaymentStatus,
    pub refunded_amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckOrderQuery {
    pub merchant_key: String,
    pub order_id: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CheckOrderResponse {
    pub payments: Vec<PaymentSummary>,
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct GetResponse {
    #[serde(flatten)]
    pub view: PaymentView,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
