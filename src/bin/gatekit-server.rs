//! Binary entry point: wires config, telemetry, store, service, HTTP
//! server, and the expiry sweeper together.

use gatekit::bank::SimulatedBankClient;
use gatekit::clock::SystemClock;
use gatekit::config::Config;
use gatekit::http::GatewayServer;
use gatekit::id::SortableIdGen;
use gatekit::merchant::InMemoryMerchantDirectory;
use gatekit::notifier::Notifier;
use gatekit::rate_limiter::MerchantSemaphores;
use gatekit::service::PaymentService;
use gatekit::store::memory::InMemoryPaymentStore;
use gatekit::sweeper::ExpirySweeper;
use std::sync::Arc;

#[tokio::main]
async fn main() -> gatekit::Result<()> {
    let config = Config::load()?;
    gatekit::telemetry::init(&config.log_filter);

    let http_client = reqwest::Client::new();
    let notifier = Notifier::spawn(http_client, config.notifier_buffer);
    let semaphores = Arc::new(MerchantSemaphores::new(config.merchant_concurrency));
    let bank: Arc<dyn gatekit::bank::BankClient> = Arc::new(SimulatedBankClient::new());

    let service = build_service(&config, notifier, semaphores, bank).await?;

    let sweeper = ExpirySweeper::new(service.clone());
    sweeper.spawn();

    let addr = config.bind_addr.parse().map_err(|e: std::net::AddrParseError| gatekit::Error::Config(e.to_string()))?;
    GatewayServer::new(service).run(addr).await
}

#[cfg(feature = "postgres")]
async fn build_service(
    config: &Config,
    notifier: Notifier,
    semaphores: Arc<MerchantSemaphores>,
    bank: Arc<dyn gatekit::bank::BankClient>,
) -> gatekit::Result<Arc<PaymentService>> {
    use gatekit::merchant::PostgresMerchantDirectory;
    use gatekit::store::postgres::PostgresPaymentStore;
    use gatekit::store::schema::ensure_schema;
    use sqlx::postgres::PgPoolOptions;

    if let Some(database_url) = &config.database_url {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_db_connections)
            .connect(database_url)
            .await?;
        ensure_schema(&pool).await?;

        let directory = Arc::new(PostgresMerchantDirectory::new(pool.clone()));
        directory.refresh().await?;
        directory.clone().spawn_refresh_task(std::time::Duration::from_secs(30));

        let store = Arc::new(PostgresPaymentStore::new(pool));

        let mut service = PaymentService::new(store, directory, bank, Arc::new(SystemClock), Arc::new(SortableIdGen), notifier, semaphores);
        service.max_attempts = config.max_attempts;
        Ok(Arc::new(service))
    } else {
        tracing::warn!("DATABASE_URL not set, falling back to the in-memory store");
        build_in_memory_service(config, notifier, semaphores, bank)
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_service(
    config: &Config,
    notifier: Notifier,
    semaphores: Arc<MerchantSemaphores>,
    bank: Arc<dyn gatekit::bank::BankClient>,
) -> gatekit::Result<Arc<PaymentService>> {
    build_in_memory_service(config, notifier, semaphores, bank)
}

fn build_in_memory_service(
    config: &Config,
    notifier: Notifier,
    semaphores: Arc<MerchantSemaphores>,
    bank: Arc<dyn gatekit::bank::BankClient>,
) -> gatekit::Result<Arc<PaymentService>> {
    let store = Arc::new(InMemoryPaymentStore::new());
    let directory = Arc::new(InMemoryMerchantDirectory::new());
    let mut service = PaymentService::new(store, directory, bank, Arc::new(SystemClock), Arc::new(SortableIdGen), notifier, semaphores);
    service.max_attempts = config.max_attempts;
    Ok(Arc::new(service))
}
