//! **[AMBIENT]** HTTP transport binding.
//!
//! The spec explicitly places HTTP routing out of core scope (spec.md §1)
//! but names the operations and wire shapes in §6. This module is the thin
//! axum adapter over `PaymentService`, grounded on `src/webhooks/server.rs`'s
//! `Router`/`State`/middleware shape: a `ServerState` struct holding
//! `Arc<PaymentService>`, routes registered with `.route(path,
//! method(handler))`, and `axum::serve` with graceful shutdown exactly as
//! `WebhookServer::run_with_shutdown` does.

pub mod dto;
pub mod server;

pub use server::{GatewayServer, ServerState};
