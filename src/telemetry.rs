//! Structured logging initialization: a `tracing-subscriber` `EnvFilter`
//! seeded from `RUST_LOG`, falling back to the configured default.

pub fn init(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
