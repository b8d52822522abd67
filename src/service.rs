//! `PaymentService`: orchestrates `Init`/`AcceptCard`/`Submit3DS`/`Confirm`/
//! `Cancel`/`CheckOrder`/`Get`, composing `Signer` + `PaymentStore` +
//! `StateMachine` + `BankClient`. This is the only layer permitted to
//! construct `Error`'s domain variants from lower-level failures.

use crate::bank::{BankClient, BankCode, CardDetails};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::id::IdGen;
use crate::merchant::MerchantDirectory;
use crate::notifier::{NotificationJob, Notifier, WebhookPayload};
use crate::payment::{NewStatusHistoryEntry, Payment, PaymentIntent, PaymentSummary, PaymentView};
use crate::rate_limiter::MerchantSemaphores;
use crate::signer::{ScalarParams, Signer};
use crate::state_machine::{PaymentStatus, StateMachine};
use crate::store::{CreateOutcome, PaymentStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;

const MAX_CAS_RETRIES: u32 = 3;
const CAS_JITTER_MS: u64 = 5;
const MAX_ATTEMPTS: u32 = 3;
const MIN_EXPIRY: ChronoDuration = ChronoDuration::minutes(5);
const MAX_EXPIRY: ChronoDuration = ChronoDuration::hours(24);
const FORM_DEADLINE_EXTENSION: ChronoDuration = ChronoDuration::minutes(30);
const BANK_RETRY_ATTEMPTS: u32 = 3;
const BANK_RETRY_BASE_MS: u64 = 100;
pub const STUCK_AUTHORIZING_AGE: ChronoDuration = ChronoDuration::minutes(5);

pub struct InitResult {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub payment_url: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AcceptResult {
    pub status: PaymentStatus,
    pub challenge_handle: Option<String>,
}

pub struct CancelResult {
    pub status: PaymentStatus,
    pub refunded_amount: Option<i64>,
}

pub struct PaymentService {
    pub(crate) store: Arc<dyn PaymentStore>,
    pub(crate) directory: Arc<dyn MerchantDirectory>,
    pub(crate) bank: Arc<dyn BankClient>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGen>,
    pub(crate) notifier: Notifier,
    pub(crate) semaphores: Arc<MerchantSemaphores>,
    pub max_attempts: u32,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        directory: Arc<dyn MerchantDirectory>,
        bank: Arc<dyn BankClient>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGen>,
        notifier: Notifier,
        semaphores: Arc<MerchantSemaphores>,
    ) -> Self {
        Self { store, directory, bank, clock, ids, notifier, semaphores, max_attempts: MAX_ATTEMPTS }
    }

    // ---- Init ------------------------------------------------------

    pub async fn init(&self, intent: PaymentIntent, provided_signature: &str) -> Result<InitResult> {
        let merchant = self
            .directory
            .lookup(&intent.merchant_key)
            .await?
            .ok_or(Error::InvalidToken)?;
        if !merchant.active {
            return Err(Error::TerminalBlocked);
        }

        let params = intent_to_scalar_params(&intent);
        if !Signer::verify(&params, provided_signature, &merchant.secret) {
            return Err(Error::InvalidToken);
        }

        self.validate_intent(&intent, &merchant.supported_currencies)?;

        if let Some(existing) = self.store.get_by_order_id(&intent.merchant_key, &intent.order_id).await? {
            return Err(Error::DuplicateOrder(existing.payment_id));
        }

        let now = self.clock.now();
        let expires_at = intent.expires_at.unwrap_or(now + MAX_EXPIRY);
        let payment_id = self.ids.next_payment_id();

        let fresh = Payment {
            payment_id: payment_id.clone(),
            intent: intent.clone(),
            status: PaymentStatus::Init,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            expires_at,
            last_error_code: None,
            last_error_message: None,
            bank_ref: None,
            card_fingerprint: None,
            version: 0,
        };

        let created = match self.store.create_if_absent(fresh).await? {
            CreateOutcome::Created(p) => p,
            CreateOutcome::AlreadyExists(existing) => {
                return Err(Error::DuplicateOrder(existing.payment_id));
            }
        };

        self.directory.touch_last_seen(&intent.merchant_key).await?;

        let advanced = self.transition_with_retry(&created, PaymentStatus::New, None, None, Some("service")).await?;
        self.notify(&advanced, &merchant.secret).await;

        Ok(InitResult {
            payment_id: advanced.payment_id.clone(),
            status: advanced.status,
            payment_url: hosted_form_url(&advanced.payment_id),
            expires_at: advanced.expires_at,
        })
    }

    fn validate_intent(&self, intent: &PaymentIntent, supported: &std::collections::HashSet<String>) -> Result<()> {
        if intent.amount <= 0 {
            return Err(Error::InvalidCard("amount must be positive".to_string()));
        }
        if !supported.is_empty() && !supported.contains(&intent.currency) {
            return Err(Error::InvalidCard(format!("unsupported currency: {}", intent.currency)));
        }
        if let Some(expires_at) = intent.expires_at {
            let now = self.clock.now();
            if expires_at < now + MIN_EXPIRY || expires_at > now + MAX_EXPIRY {
                return Err(Error::InvalidCard("expires_at out of bounds".to_string()));
            }
        }
        for url in [&intent.success_url, &intent.fail_url, &intent.notification_url] {
            if let Some(u) = url {
                if !(u.starts_with("http://") || u.starts_with("https://")) {
                    return Err(Error::InvalidCard(format!("malformed url: {u}")));
                }
            }
        }
        Ok(())
    }

    // ---- AcceptCard --------------------------------------------------

    pub async fn accept_card(&self, payment_id: &str, card: CardDetails) -> Result<AcceptResult> {
        let now = self.clock.now();
        validate_card(&card, now)?;

        let payment = self.load(payment_id).await?;
        if !matches!(
            payment.status,
            PaymentStatus::New
                | PaymentStatus::FormShowed
                | PaymentStatus::OneChooseVision
                | PaymentStatus::FinishAuthorize
                | PaymentStatus::AuthFail
        ) {
            return Err(Error::InvalidState);
        }

        if now > payment.expires_at {
            let _ = self.transition_with_retry(&payment, PaymentStatus::DeadlineExpired, None, None, Some("sweeper")).await;
            return Err(Error::Expired);
        }

        let merchant = self.merchant_for(&payment).await?;
        let permit = self.semaphores.acquire(&payment.intent.merchant_key).await;

        // `advance_through_form` is a no-op when `payment` is already past
        // `FinishAuthorize` (including a retry re-entering from `AUTH_FAIL`),
        // since none of its chain steps match that status.
        let payment = self.advance_through_form(&payment).await?;
        let payment = self.transition_with_retry(&payment, PaymentStatus::Authorizing, None, None, Some("service")).await?;
        let reference = payment.bank_ref.clone().expect("Authorizing transition assigns bank_ref");

        let (code, bank_ref) = self
            .retry_bank_call(|| self.bank.request_payment(&card, payment.intent.amount, &reference))
            .await?;
        drop(permit);

        let result = self.apply_bank_outcome(payment, code, bank_ref, &merchant.secret).await?;
        Ok(result)
    }

    async fn advance_through_form(&self, payment: &Payment) -> Result<Payment> {
        let chain = [
            (PaymentStatus::New, PaymentStatus::FormShowed),
            (PaymentStatus::FormShowed, PaymentStatus::OneChooseVision),
            (PaymentStatus::OneChooseVision, PaymentStatus::FinishAuthorize),
        ];
        let mut current = payment.clone();
        for (from, to) in chain {
            if current.status == from {
                current = self.transition_with_retry(&current, to, None, None, Some("service")).await?;
            }
        }
        Ok(current)
    }

    async fn apply_bank_outcome(
        &self,
        payment: Payment,
        code: BankCode,
        bank_ref: Option<String>,
        merchant_secret: &str,
    ) -> Result<AcceptResult> {
        let mut payment = payment;
        if let Some(r) = bank_ref {
            payment.bank_ref = Some(r);
        }

        match code {
            BankCode::Ok => {
                let authorized = self.transition_with_retry(&payment, PaymentStatus::Authorized, None, None, Some("bank")).await?;
                self.notify(&authorized, merchant_secret).await;

                if authorized.intent.pay_type == crate::payment::PayType::SingleStage {
                    let confirmed = self.confirm_internal(authorized, merchant_secret).await?;
                    Ok(AcceptResult { status: confirmed.status, challenge_handle: None })
                } else {
                    Ok(AcceptResult { status: authorized.status, challenge_handle: None })
                }
            }
            BankCode::AuthRequired => {
                let challenging =
                    self.transition_with_retry(&payment, PaymentStatus::ThreeDsChecking, None, None, Some("bank")).await?;
                Ok(AcceptResult { status: challenging.status, challenge_handle: challenging.bank_ref.clone() })
            }
            BankCode::InvalidCardInfo => {
                self.handle_auth_failure(payment, "bank rejected card details", merchant_secret).await
            }
            BankCode::Fraud | BankCode::Rejected => {
                let rejected = self
                    .transition_with_retry(&payment, PaymentStatus::Rejected, Some("BANK_REJECTED"), Some("bank flagged payment"), Some("bank"))
                    .await?;
                self.notify(&rejected, merchant_secret).await;
                Ok(AcceptResult { status: rejected.status, challenge_handle: None })
            }
            BankCode::Unavailable => Err(Error::BankUnavailable),
        }
    }

    async fn handle_auth_failure(&self, payment: Payment, message: &str, merchant_secret: &str) -> Result<AcceptResult> {
        let failed = self
            .transition_with_retry(&payment, PaymentStatus::AuthFail, Some("INVALID_CARD_INFO"), Some(message), Some("bank"))
            .await?;

        if failed.attempt_count >= self.max_attempts {
            let rejected = self
                .transition_with_retry(&failed, PaymentStatus::Rejected, Some("MAX_ATTEMPTS"), Some("max attempts exceeded"), Some("service"))
                .await?;
            self.notify(&rejected, merchant_secret).await;
            Ok(AcceptResult { status: rejected.status, challenge_handle: None })
        } else {
            Ok(AcceptResult { status: failed.status, challenge_handle: None })
        }
    }

    // ---- Submit3DS -----------------------------------------------------

    pub async fn submit_3ds(&self, payment_id: &str, otp: &str) -> Result<AcceptResult> {
        let payment = self.load(payment_id).await?;
        if !matches!(
            payment.status,
            PaymentStatus::ThreeDsChecking | PaymentStatus::SubmitPassivization | PaymentStatus::SubmitPassivization2
        ) {
            return Err(Error::InvalidState);
        }
        let bank_ref = payment.bank_ref.clone().ok_or(Error::InvalidState)?;
        let merchant = self.merchant_for(&payment).await?;

        let permit = self.semaphores.acquire(&payment.intent.merchant_key).await;
        let (code, _) = self.retry_bank_call(|| self.bank.authorize(&bank_ref, otp)).await?;
        drop(permit);

        let checked = self.transition_with_retry(&payment, PaymentStatus::ThreeDsChecked, None, None, Some("bank")).await?;

        match code {
            BankCode::Ok => {
                let authorized = self.transition_with_retry(&checked, PaymentStatus::Authorized, None, None, Some("bank")).await?;
                self.notify(&authorized, &merchant.secret).await;
                if authorized.intent.pay_type == crate::payment::PayType::SingleStage {
                    let confirmed = self.confirm_internal(authorized, &merchant.secret).await?;
                    Ok(AcceptResult { status: confirmed.status, challenge_handle: None })
                } else {
                    Ok(AcceptResult { status: authorized.status, challenge_handle: None })
                }
            }
            _ => self.handle_auth_failure(checked, "3-D Secure check rejected", &merchant.secret).await,
        }
    }

    // ---- Confirm -------------------------------------------------------

    pub async fn confirm(&self, payment_id: &str, provided_signature: &str) -> Result<PaymentStatus> {
        let payment = self.load(payment_id).await?;
        let merchant = self.merchant_for(&payment).await?;
        self.verify_signature(&payment, provided_signature, &merchant.secret)?;

        if payment.status != PaymentStatus::Authorized {
            return Err(Error::InvalidState);
        }

        let confirmed = self.confirm_internal(payment, &merchant.secret).await?;
        Ok(confirmed.status)
    }

    async fn confirm_internal(&self, payment: Payment, merchant_secret: &str) -> Result<Payment> {
        let confirming = self.transition_with_retry(&payment, PaymentStatus::Confirming, None, None, Some("service")).await?;
        let bank_ref = confirming.bank_ref.clone().unwrap_or_default();
        let code = self.retry_bank_call(|| self.bank.capture(&bank_ref)).await?;

        match code {
            BankCode::Ok => {
                let confirmed = self.transition_with_retry(&confirming, PaymentStatus::Confirmed, None, None, Some("bank")).await?;
                self.notify(&confirmed, merchant_secret).await;
                Ok(confirmed)
            }
            _ => {
                let failed = self
                    .transition_with_retry(&confirming, PaymentStatus::AuthFail, Some("BANK_REJECTED"), Some("capture failed"), Some("bank"))
                    .await?;
                self.notify(&failed, merchant_secret).await;
                Ok(failed)
            }
        }
    }

    // ---- Cancel ----------------------------------------------------

    pub async fn cancel(&self, payment_id: &str, provided_signature: &str, amount: Option<i64>) -> Result<CancelResult> {
        let payment = self.load(payment_id).await?;
        let merchant = self.merchant_for(&payment).await?;
        self.verify_signature(&payment, provided_signature, &merchant.secret)?;

        match payment.status {
            PaymentStatus::New | PaymentStatus::FormShowed => {
                let cancelled = self.transition_with_retry(&payment, PaymentStatus::Cancelled, None, None, Some("merchant")).await?;
                self.notify(&cancelled, &merchant.secret).await;
                Ok(CancelResult { status: cancelled.status, refunded_amount: None })
            }
            PaymentStatus::Authorized => {
                let reversing = self.transition_with_retry(&payment, PaymentStatus::Reversing, None, None, Some("merchant")).await?;
                let bank_ref = reversing.bank_ref.clone().unwrap_or_default();
                let _ = self.retry_bank_call(|| self.bank.reverse(&bank_ref, amount)).await?;

                let partial = amount.map(|a| a < payment.intent.amount).unwrap_or(false);
                let to = if partial { PaymentStatus::PartialReversed } else { PaymentStatus::Reversed };
                let done = self.transition_with_retry(&reversing, to, None, None, Some("bank")).await?;
                self.notify(&done, &merchant.secret).await;
                Ok(CancelResult { status: done.status, refunded_amount: amount })
            }
            PaymentStatus::Confirmed => {
                let refunding = self.transition_with_retry(&payment, PaymentStatus::Refunding, None, None, Some("merchant")).await?;
                let bank_ref = refunding.bank_ref.clone().unwrap_or_default();
                let _ = self.retry_bank_call(|| self.bank.refund(&bank_ref, amount)).await?;

                let partial = amount.map(|a| a < payment.intent.amount).unwrap_or(false);
                let to = if partial { PaymentStatus::PartialRefunded } else { PaymentStatus::Refunded };
                let done = self.transition_with_retry(&refunding, to, None, None, Some("bank")).await?;
                self.notify(&done, &merchant.secret).await;
                Ok(CancelResult { status: done.status, refunded_amount: amount })
            }
            _ => Err(Error::InvalidState),
        }
    }

    // ---- CheckOrder / Get -----------------------------------------

    pub async fn check_order(&self, merchant_key: &str, order_id: &str, provided_signature: &str) -> Result<Vec<PaymentSummary>> {
        let merchant = self
            .directory
            .lookup(merchant_key)
            .await?
            .ok_or(Error::InvalidToken)?;

        let mut params = ScalarParams::new();
        params.insert("MerchantKey".to_string(), merchant_key.to_string());
        params.insert("OrderId".to_string(), order_id.to_string());
        if !Signer::verify(&params, provided_signature, &merchant.secret) {
            return Err(Error::InvalidToken);
        }

        let mut payments = self.store.list_by_order(merchant_key, order_id).await?;
        payments.sort_by_key(|p| p.created_at);

        let mut summaries = Vec::with_capacity(payments.len());
        for p in payments {
            let mut history = self.store.history_for(&p.payment_id).await?;
            history.sort_by_key(|h| h.at);
            let tail: Vec<_> = history.into_iter().rev().take(10).rev().collect();
            summaries.push(PaymentSummary {
                payment_id: p.payment_id,
                status: p.status,
                amount: p.intent.amount,
                currency: p.intent.currency,
                created_at: p.created_at,
                updated_at: p.updated_at,
                refunded_amount: None,
                history_tail: tail,
            });
        }
        Ok(summaries)
    }

    pub async fn get(&self, payment_id: &str, provided_signature: &str) -> Result<PaymentView> {
        let payment = self.load(payment_id).await?;
        let merchant = self.merchant_for(&payment).await?;
        self.verify_signature(&payment, provided_signature, &merchant.secret)?;
        Ok(PaymentView::from(&payment))
    }

    // ---- Sweeper entry point ----------------------------------------

    /// Attempts `current -> DEADLINE_EXPIRED`; called by the sweeper for
    /// every non-terminal payment past its deadline.
    pub async fn expire(&self, payment_id: &str) -> Result<()> {
        let payment = self.load(payment_id).await?;
        if payment.is_terminal() {
            return Ok(());
        }
        if !StateMachine::can_transition(payment.status, PaymentStatus::DeadlineExpired) {
            return Err(Error::InvalidTransition { from: payment.status, to: PaymentStatus::DeadlineExpired });
        }
        let merchant = self.merchant_for(&payment).await?;
        let expired = self
            .transition_with_retry(&payment, PaymentStatus::DeadlineExpired, None, None, Some("sweeper"))
            .await?;
        self.notify(&expired, &merchant.secret).await;
        Ok(())
    }

    /// Reconciles payments that have sat in `AUTHORIZING` for longer than
    /// `STUCK_AUTHORIZING_AGE` — the mark of a bank call whose outcome never
    /// made it back to the caller (the bounded retry in `retry_bank_call`
    /// gave up, or the process crashed mid-call). Re-queries the bank for
    /// `bank_ref` and drives the same outcome-to-transition mapping
    /// `accept_card` uses. Called by the sweeper alongside `expire`.
    pub async fn reconcile_stuck_authorizations(&self) -> Result<()> {
        let now = self.clock.now();
        let stuck = self.store.list_by_status(PaymentStatus::Authorizing, 500).await?;
        for payment in stuck {
            if now - payment.updated_at < STUCK_AUTHORIZING_AGE {
                continue;
            }
            if let Err(err) = self.reconcile_one_authorizing(payment).await {
                tracing::warn!(error = %err, "failed to reconcile a stuck AUTHORIZING payment");
            }
        }
        Ok(())
    }

    async fn reconcile_one_authorizing(&self, payment: Payment) -> Result<()> {
        let Some(bank_ref) = payment.bank_ref.clone() else {
            return Ok(());
        };
        let merchant = self.merchant_for(&payment).await?;
        let payment_id = payment.payment_id.clone();
        match self.bank.query(&bank_ref).await {
            Ok(code) => match self.apply_bank_outcome(payment, code, Some(bank_ref), &merchant.secret).await {
                Ok(_) => Ok(()),
                Err(Error::BankUnavailable) => Ok(()),
                Err(err) => Err(err),
            },
            Err(err) => {
                tracing::warn!(payment_id = %payment_id, error = %err, "bank query failed during reconciliation");
                Ok(())
            }
        }
    }

    // ---- internals ---------------------------------------------------

    async fn load(&self, payment_id: &str) -> Result<Payment> {
        self.store.get_by_id(payment_id).await?.ok_or(Error::InvalidState)
    }

    async fn merchant_for(&self, payment: &Payment) -> Result<crate::merchant::Merchant> {
        self.directory
            .lookup(&payment.intent.merchant_key)
            .await?
            .ok_or_else(|| Error::Internal("merchant vanished for existing payment".to_string()))
    }

    fn verify_signature(&self, payment: &Payment, provided_signature: &str, secret: &str) -> Result<()> {
        let mut params = ScalarParams::new();
        params.insert("PaymentId".to_string(), payment.payment_id.clone());
        if !Signer::verify(&params, provided_signature, secret) {
            return Err(Error::InvalidToken);
        }
        Ok(())
    }

    async fn notify(&self, payment: &Payment, merchant_secret: &str) {
        let Some(url) = payment.intent.notification_url.clone() else { return };
        self.notifier
            .notify(NotificationJob {
                url,
                merchant_secret: merchant_secret.to_string(),
                payload: WebhookPayload {
                    payment_id: payment.payment_id.clone(),
                    merchant_key: payment.intent.merchant_key.clone(),
                    order_id: payment.intent.order_id.clone(),
                    status: payment.status,
                    amount: payment.intent.amount,
                    currency: payment.intent.currency.clone(),
                },
            })
            .await;
    }

    /// Calls out to `BankClient`, retrying bounded-exponentially (3
    /// attempts, 100ms base, per spec.md §4.5) on transport failure or a
    /// `BankCode::Unavailable` response before giving up. On exhaustion, any
    /// underlying transport error is folded into `Error::BankUnavailable` —
    /// the caller only ever observes the gateway's own retryable-unavailable
    /// taxonomy, never the transport's.
    async fn retry_bank_call<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        T: HasBankCode,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = call().await;
            let retryable = match &outcome {
                Ok(v) => v.bank_code() == BankCode::Unavailable,
                Err(_) => true,
            };
            attempt += 1;
            if !retryable || attempt >= BANK_RETRY_ATTEMPTS {
                return match outcome {
                    Err(_) if retryable => Err(Error::BankUnavailable),
                    other => other,
                };
            }
            let backoff_ms = BANK_RETRY_BASE_MS * (1u64 << (attempt - 1));
            tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
        }
    }

    /// Applies one §4.3 `Transition`, retrying on `CONCURRENT_MODIFICATION`
    /// up to `MAX_CAS_RETRIES` times with jitter, per spec.md §4.5 step 5.
    async fn transition_with_retry(
        &self,
        payment: &Payment,
        to: PaymentStatus,
        error_code: Option<&str>,
        message: Option<&str>,
        actor: Option<&str>,
    ) -> Result<Payment> {
        let mut current = payment.clone();
        for _ in 0..=MAX_CAS_RETRIES {
            match self.try_transition(&current, to, error_code, message, actor).await? {
                Some(updated) => return Ok(updated),
                None => {
                    let jitter = rand::random::<u64>() % CAS_JITTER_MS;
                    tokio::time::sleep(std::time::Duration::from_millis(jitter)).await;
                    current = self.load(&current.payment_id).await?;
                }
            }
        }
        Err(Error::ConcurrentModification)
    }

    async fn try_transition(
        &self,
        payment: &Payment,
        to: PaymentStatus,
        error_code: Option<&str>,
        message: Option<&str>,
        actor: Option<&str>,
    ) -> Result<Option<Payment>> {
        if !StateMachine::can_transition(payment.status, to) {
            return Err(Error::InvalidTransition { from: payment.status, to });
        }

        let now = self.clock.now();
        let mut updated = payment.clone();
        updated.status = to;
        updated.updated_at = now;
        updated.last_error_code = error_code.map(str::to_string);
        updated.last_error_message = message.map(str::to_string);

        if to == PaymentStatus::Authorizing {
            updated.attempt_count += 1;
            // Assigned before the bank call is made (not taken from its
            // response) so a stuck AUTHORIZING payment always carries a
            // reference the sweeper can later query, even if the bank call's
            // outcome never made it back to this process. Each attempt gets
            // its own reference since a retry is a new authorization attempt.
            updated.bank_ref = Some(format!("req-{}-{}", updated.payment_id, updated.attempt_count));
        }
        if matches!(to, PaymentStatus::New | PaymentStatus::FormShowed) {
            updated.expires_at = std::cmp::max(updated.expires_at, now + FORM_DEADLINE_EXTENSION);
        }

        let history = NewStatusHistoryEntry {
            payment_id: payment.payment_id.clone(),
            from_status: payment.status,
            to_status: to,
            at: now,
            actor: actor.map(str::to_string),
            error_code: error_code.map(str::to_string),
            message: message.map(str::to_string),
            is_rollback: false,
            rollback_from: None,
        };

        match self.store.update_conditional(&updated, payment.version, history).await? {
            crate::store::CasOutcome::Applied => {
                let mut result = updated;
                result.version = payment.version + 1;
                Ok(Some(result))
            }
            crate::store::CasOutcome::VersionMismatch => Ok(None),
        }
    }
}

/// Lets `retry_bank_call` inspect the `BankCode` of either a bare-code or a
/// `(code, bank_ref)` response without two near-identical retry loops.
trait HasBankCode {
    fn bank_code(&self) -> BankCode;
}

impl HasBankCode for BankCode {
    fn bank_code(&self) -> BankCode {
        *self
    }
}

impl HasBankCode for (BankCode, Option<String>) {
    fn bank_code(&self) -> BankCode {
        self.0
    }
}

fn hosted_form_url(payment_id: &str) -> String {
    format!("/pay/{payment_id}")
}

fn intent_to_scalar_params(intent: &PaymentIntent) -> ScalarParams {
    let value = serde_json::to_value(intent).unwrap_or(serde_json::Value::Null);
    crate::signer::scalars_from_json(&value)
}

fn validate_card(card: &CardDetails, now: DateTime<Utc>) -> Result<()> {
    if card.number.is_empty() || card.number.len() > 19 || !card.number.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidCard("malformed card number".to_string()));
    }
    if !luhn_check(&card.number) {
        return Err(Error::InvalidCard("failed Luhn check".to_string()));
    }
    if !is_valid_expiry(&card.expiry, now) {
        return Err(Error::InvalidCard("malformed or past expiry".to_string()));
    }
    if card.cvv.len() < 3 || card.cvv.len() > 4 || !card.cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidCard("malformed cvv".to_string()));
    }
    if card.holder.trim().is_empty() {
        return Err(Error::InvalidCard("missing holder name".to_string()));
    }
    Ok(())
}

fn luhn_check(number: &str) -> bool {
    let digits: Vec<u32> = number.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.is_empty() {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| if i % 2 == 1 { let doubled = d * 2; if doubled > 9 { doubled - 9 } else { doubled } } else { d })
        .sum();
    sum % 10 == 0
}

fn is_valid_expiry(expiry: &str, now: DateTime<Utc>) -> bool {
    let Some((month, year)) = expiry.split_once('/') else { return false };
    let (Ok(month), Ok(year)) = (month.parse::<u32>(), year.parse::<i32>()) else { return false };
    if !(1..=12).contains(&month) {
        return false;
    }
    let full_year = 2000 + year;
    let current_year = now.format("%Y").to_string().parse::<i32>().unwrap_or(0);
    let current_month = now.format("%m").to_string().parse::<u32>().unwrap_or(0);
    full_year > current_year || (full_year == current_year && month >= current_month)
}
