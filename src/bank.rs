//! `BankClient`: the simulated issuing-bank protocol.
//!
//! Real card-network integration is out of scope; this module ships the
//! collaborator trait plus a deterministic in-process test double,
//! `SimulatedBankClient`, so the full lifecycle is exercisable without a
//! real bank.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankCode {
    Ok,
    AuthRequired,
    InvalidCardInfo,
    Fraud,
    Rejected,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct CardDetails {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
    pub holder: String,
}

#[async_trait]
pub trait BankClient: Send + Sync {
    /// `reference` is the caller's own idempotency key for this attempt
    /// (persisted as the payment's `bank_ref` before the call is made), not
    /// a value the bank hands back — so the caller can reconcile later even
    /// if this call's response never arrives.
    async fn request_payment(&self, card: &CardDetails, amount_minor: i64, reference: &str) -> crate::Result<(BankCode, Option<String>)>;
    async fn authorize(&self, bank_ref: &str, otp: &str) -> crate::Result<(BankCode, Option<String>)>;
    async fn capture(&self, bank_ref: &str) -> crate::Result<BankCode>;
    async fn reverse(&self, bank_ref: &str, amount_minor: Option<i64>) -> crate::Result<BankCode>;
    async fn refund(&self, bank_ref: &str, amount_minor: Option<i64>) -> crate::Result<BankCode>;

    /// Re-queries the bank for the outcome already associated with
    /// `bank_ref`. Used by the expiry sweeper to reconcile payments stuck in
    /// `AUTHORIZING` after a transport failure left the original
    /// `request_payment`/`authorize` outcome unresolved to the caller.
    async fn query(&self, bank_ref: &str) -> crate::Result<BankCode>;
}

/// In-process bank double. Card numbers ending `0002` force `AUTH_REQUIRED`,
/// `0003` forces `INVALID_CARD_INFO`, `0009` forces `FRAUD`; anything else
/// (including the Luhn-valid `4111111111111111` test card) succeeds
/// immediately. OTP `"000"` forces a rejected 3-DS check; any other
/// well-formed OTP succeeds. Rules are overridable for integration tests
/// that need to force a specific path.
pub struct SimulatedBankClient {
    rules: Mutex<HashMap<String, BankCode>>,
    ref_outcomes: Mutex<HashMap<String, BankCode>>,
}

impl SimulatedBankClient {
    pub fn new() -> Self {
        Self { rules: Mutex::new(HashMap::new()), ref_outcomes: Mutex::new(HashMap::new()) }
    }

    /// Force the outcome for a specific card number or OTP value.
    pub fn force(&self, trigger: &str, code: BankCode) {
        self.rules.lock().unwrap().insert(trigger.to_string(), code);
    }

    /// Force what `query` reports for a given `bank_ref`, independent of the
    /// outcome the original `request_payment` call returned. Lets tests
    /// simulate a bank that actually settled a request whose response was
    /// lost in transit.
    pub fn force_query(&self, bank_ref: &str, code: BankCode) {
        self.ref_outcomes.lock().unwrap().insert(bank_ref.to_string(), code);
    }

    fn card_outcome(&self, card: &CardDetails) -> BankCode {
        if let Some(code) = self.rules.lock().unwrap().get(&card.number) {
            return *code;
        }
        let tail = &card.number[card.number.len().saturating_sub(4)..];
        match tail {
            "0002" => BankCode::AuthRequired,
            "0003" => BankCode::InvalidCardInfo,
            "0009" => BankCode::Fraud,
            "0004" => BankCode::Rejected,
            _ => BankCode::Ok,
        }
    }

    fn otp_outcome(&self, otp: &str) -> BankCode {
        if let Some(code) = self.rules.lock().unwrap().get(otp) {
            return *code;
        }
        match otp {
            "000" => BankCode::Rejected,
            _ => BankCode::Ok,
        }
    }
}

impl Default for SimulatedBankClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BankClient for SimulatedBankClient {
    async fn request_payment(&self, card: &CardDetails, _amount_minor: i64, reference: &str) -> crate::Result<(BankCode, Option<String>)> {
        let code = self.card_outcome(card);
        self.ref_outcomes.lock().unwrap().insert(reference.to_string(), code);
        let bank_ref = matches!(code, BankCode::Ok | BankCode::AuthRequired).then(|| reference.to_string());
        Ok((code, bank_ref))
    }

    async fn authorize(&self, bank_ref: &str, otp: &str) -> crate::Result<(BankCode, Option<String>)> {
        let code = self.otp_outcome(otp);
        Ok((code, Some(bank_ref.to_string())))
    }

    async fn capture(&self, _bank_ref: &str) -> crate::Result<BankCode> {
        Ok(BankCode::Ok)
    }

    async fn reverse(&self, _bank_ref: &str, _amount_minor: Option<i64>) -> crate::Result<BankCode> {
        Ok(BankCode::Ok)
    }

    async fn refund(&self, _bank_ref: &str, _amount_minor: Option<i64>) -> crate::Result<BankCode> {
        Ok(BankCode::Ok)
    }

    async fn query(&self, bank_ref: &str) -> crate::Result<BankCode> {
        Ok(self.ref_outcomes.lock().unwrap().get(bank_ref).copied().unwrap_or(BankCode::Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(number: &str) -> CardDetails {
        CardDetails {
            number: number.to_string(),
            expiry: "12/30".to_string(),
            cvv: "123".to_string(),
            holder: "X".to_string(),
        }
    }

    #[tokio::test]
    async fn default_card_succeeds() {
        let bank = SimulatedBankClient::new();
        let (code, bank_ref) = bank.request_payment(&card("4111111111111111"), 1000, "req-1").await.unwrap();
        assert_eq!(code, BankCode::Ok);
        assert_eq!(bank_ref.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn card_ending_0002_requires_3ds() {
        let bank = SimulatedBankClient::new();
        let (code, bank_ref) = bank.request_payment(&card("4000000000000002"), 1000, "req-1").await.unwrap();
        assert_eq!(code, BankCode::AuthRequired);
        assert!(bank_ref.is_some());
    }

    #[tokio::test]
    async fn card_ending_0009_is_fraud() {
        let bank = SimulatedBankClient::new();
        let (code, bank_ref) = bank.request_payment(&card("4000000000000009"), 1000, "req-1").await.unwrap();
        assert_eq!(code, BankCode::Fraud);
        assert!(bank_ref.is_none());
    }

    #[tokio::test]
    async fn otp_000_is_rejected_otherwise_ok() {
        let bank = SimulatedBankClient::new();
        let (code, _) = bank.authorize("bank_ref_1", "000").await.unwrap();
        assert_eq!(code, BankCode::Rejected);
        let (code, _) = bank.authorize("bank_ref_1", "123").await.unwrap();
        assert_eq!(code, BankCode::Ok);
    }

    #[tokio::test]
    async fn forced_rule_overrides_default() {
        let bank = SimulatedBankClient::new();
        bank.force("4111111111111111", BankCode::Fraud);
        let (code, _) = bank.request_payment(&card("4111111111111111"), 1000, "req-1").await.unwrap();
        assert_eq!(code, BankCode::Fraud);
    }

    #[tokio::test]
    async fn query_reports_the_outcome_recorded_at_request_time() {
        let bank = SimulatedBankClient::new();
        let (_, bank_ref) = bank.request_payment(&card("4111111111111111"), 1000, "req-1").await.unwrap();
        let bank_ref = bank_ref.unwrap();
        assert_eq!(bank.query(&bank_ref).await.unwrap(), BankCode::Ok);
    }

    #[tokio::test]
    async fn query_can_be_overridden_independently_of_the_original_response() {
        let bank = SimulatedBankClient::new();
        bank.force_query("bank_ref_1", BankCode::InvalidCardInfo);
        assert_eq!(bank.query("bank_ref_1").await.unwrap(), BankCode::InvalidCardInfo);
    }
}
