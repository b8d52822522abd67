//! Typed configuration, loaded from the environment.
//!
//! Follows the builder conventions already used by this crate's `Config`/
//! `CacheConfig` types, adapted to load from env vars (`dotenvy` + `clap`'s
//! `env` attribute) instead of constructor arguments, since this is now a
//! standalone service rather than a library consumed by another binary.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "gatekit-server", about = "Merchant-facing payment gateway")]
pub struct Config {
    #[arg(long, env = "GATEKIT_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "GATEKIT_MAX_DB_CONNECTIONS", default_value_t = 10)]
    pub max_db_connections: u32,

    #[arg(long, env = "GATEKIT_MERCHANT_CONCURRENCY", default_value_t = 8)]
    pub merchant_concurrency: usize,

    #[arg(long, env = "GATEKIT_NOTIFIER_BUFFER", default_value_t = 1024)]
    pub notifier_buffer: usize,

    #[arg(long, env = "GATEKIT_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl Config {
    /// Loads `.env` (if present) then parses from the process environment
    /// and argv, matching the `dotenvy::dotenv().ok()` convention used
    /// across this crate's binaries.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Config::parse())
    }
}
