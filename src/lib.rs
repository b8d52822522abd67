//! # gatekit
//!
//! A merchant-facing payment gateway: accepts payment intents over HTTP,
//! drives each payment through a persistent lifecycle state machine,
//! mediates with a simulated issuing bank (including 3-D Secure), and
//! exposes status/check/cancel operations. Authenticates every request by
//! reproducing a deterministic request signature, and guarantees that every
//! state change is linearized, auditable, and idempotent per merchant
//! order.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gatekit::bank::SimulatedBankClient;
//! use gatekit::clock::SystemClock;
//! use gatekit::id::SortableIdGen;
//! use gatekit::merchant::InMemoryMerchantDirectory;
//! use gatekit::notifier::Notifier;
//! use gatekit::rate_limiter::MerchantSemaphores;
//! use gatekit::service::PaymentService;
//! use gatekit::store::memory::InMemoryPaymentStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> gatekit::Result<()> {
//! let store = Arc::new(InMemoryPaymentStore::new());
//! let directory = Arc::new(InMemoryMerchantDirectory::new());
//! let bank = Arc::new(SimulatedBankClient::new());
//! let notifier = Notifier::spawn(reqwest::Client::new(), 1024);
//! let semaphores = Arc::new(MerchantSemaphores::new(8));
//!
//! let service = PaymentService::new(
//!     store,
//!     directory,
//!     bank,
//!     Arc::new(SystemClock),
//!     Arc::new(SortableIdGen),
//!     notifier,
//!     semaphores,
//! );
//! # let _ = service;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module layout
//!
//! - [`signer`] — request-signature authentication protocol
//! - [`state_machine`] — the payment lifecycle edge table
//! - [`payment`] — `PaymentIntent`/`Payment`/`StatusHistory` data model
//! - [`merchant`] — `Merchant`/`MerchantDirectory`
//! - [`store`] — `PaymentStore` persistence contract (in-memory + Postgres)
//! - [`bank`] — `BankClient` trait and the in-process simulator
//! - [`service`] — `PaymentService`, the orchestration layer
//! - [`sweeper`] — the expiry sweeper background task
//! - [`notifier`] — asynchronous webhook delivery
//! - [`http`] — the axum transport binding
//! - [`config`] — environment-driven configuration
//! - [`telemetry`] — `tracing` initialization
//!
//! ## Feature Flags
//!
//! - `postgres` (default) — enables the Postgres-backed `PaymentStore` and
//!   `MerchantDirectory` implementations. Disable for an in-memory-only
//!   build, e.g. for tests that don't need a database.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(rust_2018_idioms)]

pub mod bank;
pub mod clock;
pub mod config;
mod error;
pub mod http;
pub mod id;
pub mod merchant;
pub mod payment;
pub mod rate_limiter;
pub mod service;
pub mod signer;
pub mod state_machine;
pub mod store;
pub mod sweeper;
pub mod notifier;
pub mod telemetry;

pub use error::{Error, Result};
pub use payment::{Payment, PaymentIntent, PaymentSummary, PaymentView, StatusHistoryEntry};
pub use service::PaymentService;
pub use state_machine::{PaymentStatus, StateMachine};
