//! Shared test harness for the integration suite.
//!
//! Bundles an in-memory `PaymentStore` + `SimulatedBankClient` behind a
//! `PaymentService`, the same `TestContext` shape the teacher's own
//! integration tests use to bundle a client and its fixtures, here
//! pointed at the gateway's own collaborators instead of a live Payrix
//! sandbox account.

use gatekit::bank::SimulatedBankClient;
use gatekit::clock::SystemClock;
use gatekit::merchant::{InMemoryMerchantDirectory, Merchant};
use gatekit::notifier::Notifier;
use gatekit::payment::{PayType, PaymentIntent};
use gatekit::rate_limiter::MerchantSemaphores;
use gatekit::service::PaymentService;
use gatekit::signer::{ScalarParams, Signer};
use gatekit::store::memory::InMemoryPaymentStore;
use std::collections::HashSet;
use std::sync::Arc;

pub const MERCHANT_KEY: &str = "m1";
pub const MERCHANT_SECRET: &str = "s";

pub struct TestContext {
    pub service: Arc<PaymentService>,
    pub store: Arc<InMemoryPaymentStore>,
    pub directory: Arc<InMemoryMerchantDirectory>,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryPaymentStore::new());
        let directory = Arc::new(InMemoryMerchantDirectory::new());
        directory.insert(Merchant {
            merchant_key: MERCHANT_KEY.to_string(),
            secret: MERCHANT_SECRET.to_string(),
            active: true,
            supported_currencies: HashSet::from(["RUB".to_string()]),
            last_seen: None,
        });

        let bank = Arc::new(SimulatedBankClient::new());
        let notifier = Notifier::spawn(reqwest::Client::new(), 16);
        let semaphores = Arc::new(MerchantSemaphores::new(8));

        let service = Arc::new(PaymentService::new(
            store.clone(),
            directory.clone(),
            bank,
            Arc::new(SystemClock),
            Arc::new(gatekit::id::SortableIdGen),
            notifier,
            semaphores,
        ));

        Self { service, store, directory }
    }

    pub fn sample_intent(&self, order_id: &str) -> PaymentIntent {
        PaymentIntent {
            merchant_key: MERCHANT_KEY.to_string(),
            order_id: order_id.to_string(),
            amount: 1000,
            currency: "RUB".to_string(),
            description: "order".to_string(),
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

    pub fn sign_intent(&self, intent: &PaymentIntent) -> String {
        let value = serde_json::to_value(intent).unwrap();
        let params = gatekit::signer::scalars_from_json(&value);
        Signer::sign(&params, MERCHANT_SECRET)
    }

    pub fn sign_payment_id(&self, payment_id: &str) -> String {
        let mut params = ScalarParams::new();
        params.insert("PaymentId".to_string(), payment_id.to_string());
        Signer::sign(&params, MERCHANT_SECRET)
    }

    pub fn sign_order(&self, merchant_key: &str, order_id: &str) -> String {
        let mut params = ScalarParams::new();
        params.insert("MerchantKey".to_string(), merchant_key.to_string());
        params.insert("OrderId".to_string(), order_id.to_string());
        Signer::sign(&params, MERCHANT_SECRET)
    }
}

pub fn good_card() -> gatekit::bank::CardDetails {
    gatekit::bank::CardDetails {
        number: "4111111111111111".to_string(),
        expiry: "12/30".to_string(),
        cvv: "123".to_string(),
        holder: "CARD HOLDER".to_string(),
    }
}

pub fn three_ds_card() -> gatekit::bank::CardDetails {
    gatekit::bank::CardDetails {
        number: "4000000000000002".to_string(),
        expiry: "12/30".to_string(),
        cvv: "123".to_string(),
        holder: "CARD HOLDER".to_string(),
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
