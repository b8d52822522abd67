//! Expiry sweeper.
//!
//! As spec.md §4.6: every 30s, scan non-terminal payments whose
//! `expires_at` has passed and transition each to `DEADLINE_EXPIRED`, then
//! reconcile payments stuck in `AUTHORIZING` for longer than
//! `service::STUCK_AUTHORIZING_AGE` by re-querying the bank for `bank_ref`
//! (spec.md §4.5's transient-failure handling). Grounded on the
//! `cleanup_expired_payments` background task in
//! `other_examples/608dc4cf_hackload-kz-rorobotics__src-services-payment.rs`,
//! generalized from a single-client cleanup loop to the full state-machine
//! edge table: states with no `DEADLINE_EXPIRED` edge are simply skipped.

use crate::clock::Clock;
use crate::service::PaymentService;
use std::sync::Arc;
use std::time::Duration;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct ExpirySweeper {
    service: Arc<PaymentService>,
}

impl ExpirySweeper {
    pub fn new(service: Arc<PaymentService>) -> Self {
        Self { service }
    }

    /// Spawns the sweep loop; call once at service startup.
    pub fn spawn(self) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        });
    }

    pub async fn sweep_once(&self) {
        let now = self.service.clock.now();
        let expired = match self.service.store.find_expired_since(now).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "expiry sweep: failed to list expired payments");
                return;
            }
        };

        for payment in expired {
            match self.service.expire(&payment.payment_id).await {
                Ok(()) => {
                    tracing::info!(payment_id = %payment.payment_id, "payment expired by sweeper");
                }
                Err(crate::Error::InvalidTransition { .. }) => {
                    // No DEADLINE_EXPIRED edge from the current state; nothing to do.
                }
                Err(err) => {
                    tracing::warn!(payment_id = %payment.payment_id, error = %err, "expiry sweep transition failed");
                }
            }
        }

        if let Err(err) = self.service.reconcile_stuck_authorizations().await {
            tracing::error!(error = %err, "expiry sweep: failed to reconcile stuck AUTHORIZING payments");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::SimulatedBankClient;
    use crate::clock::FixedClock;
    use crate::merchant::{InMemoryMerchantDirectory, Merchant};
    use crate::payment::{PayType, PaymentIntent};
    use crate::rate_limiter::MerchantSemaphores;
    use crate::state_machine::PaymentStatus;
    use crate::store::memory::InMemoryPaymentStore;
    use crate::store::PaymentStore;
    use std::collections::HashSet;

    fn merchant() -> Merchant {
        Merchant {
            merchant_key: "m1".to_string(),
            secret: "s".to_string(),
            active: true,
            supported_currencies: HashSet::from(["RUB".to_string()]),
            last_seen: None,
        }
    }

    #[tokio::test]
    async fn sweep_transitions_expired_new_payment() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let directory = Arc::new(InMemoryMerchantDirectory::new());
        directory.insert(merchant());
        let bank = Arc::new(SimulatedBankClient::new());
        let notifier = crate::notifier::Notifier::spawn(reqwest::Client::new(), 8);
        let semaphores = Arc::new(MerchantSemaphores::new(4));
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));

        let service = Arc::new(PaymentService::new(
            store.clone(),
            directory,
            bank,
            clock.clone(),
            Arc::new(crate::id::SortableIdGen),
            notifier,
            semaphores,
        ));

        let intent = PaymentIntent {
            merchant_key: "m1".to_string(),
            order_id: "o1".to_string(),
            amount: 1000,
            currency: "RUB".to_string(),
            description: "d".to_string(),
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
        };
        let value = serde_json::to_value(&intent).unwrap();
        let params = crate::signer::scalars_from_json(&value);
        let token = crate::signer::Signer::sign(&params, "s");

        let init = service.init(intent, &token).await.unwrap();
        clock.advance(chrono::Duration::hours(25));
        let sweeper = ExpirySweeper::new(service.clone());
        sweeper.sweep_once().await;

        let payment = store.get_by_id(&init.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::DeadlineExpired);
    }

    #[tokio::test]
    async fn sweep_reconciles_payment_stuck_after_bank_unavailable() {
        use crate::bank::{BankCode, CardDetails};

        let store = Arc::new(InMemoryPaymentStore::new());
        let directory = Arc::new(InMemoryMerchantDirectory::new());
        directory.insert(merchant());
        let bank = Arc::new(SimulatedBankClient::new());
        let notifier = crate::notifier::Notifier::spawn(reqwest::Client::new(), 8);
        let semaphores = Arc::new(MerchantSemaphores::new(4));
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));

        let service = Arc::new(PaymentService::new(
            store.clone(),
            directory,
            bank.clone(),
            clock.clone(),
            Arc::new(crate::id::SortableIdGen),
            notifier,
            semaphores,
        ));

        let intent = PaymentIntent {
            merchant_key: "m1".to_string(),
            order_id: "o2".to_string(),
            amount: 1000,
            currency: "RUB".to_string(),
            description: "d".to_string(),
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
        };
        let value = serde_json::to_value(&intent).unwrap();
        let params = crate::signer::scalars_from_json(&value);
        let token = crate::signer::Signer::sign(&params, "s");
        let init = service.init(intent, &token).await.unwrap();

        // Every attempt against this card reports UNAVAILABLE, so the
        // bounded retry in `retry_bank_call` exhausts and `accept_card`
        // surfaces BANK_UNAVAILABLE, leaving the payment in AUTHORIZING.
        bank.force("4111111111111111", BankCode::Unavailable);
        let card = CardDetails {
            number: "4111111111111111".to_string(),
            expiry: "12/30".to_string(),
            cvv: "123".to_string(),
            holder: "X".to_string(),
        };
        let err = service.accept_card(&init.payment_id, card).await.unwrap_err();
        assert!(matches!(err, crate::Error::BankUnavailable));

        let stuck = store.get_by_id(&init.payment_id).await.unwrap().unwrap();
        assert_eq!(stuck.status, PaymentStatus::Authorizing);
        let reference = stuck.bank_ref.clone().expect("AUTHORIZING payment carries a bank reference");

        // The bank actually settled the request; only its response got lost.
        bank.force_query(&reference, BankCode::Ok);
        clock.advance(chrono::Duration::minutes(6));

        let sweeper = ExpirySweeper::new(service.clone());
        sweeper.sweep_once().await;

        let recovered = store.get_by_id(&init.payment_id).await.unwrap().unwrap();
        assert_eq!(recovered.status, PaymentStatus::Confirmed);
    }
}
