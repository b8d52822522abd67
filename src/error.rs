//! Error types for the payment gateway.

use crate::state_machine::PaymentStatus;

/// All possible errors surfaced by the gateway.
///
/// `PaymentService` is the only layer that constructs these from lower-level
/// failures (store errors, bank transport errors, signature mismatches); every
/// other component returns a narrower, typed error that gets folded in here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request signature did not match the one computed from the merchant secret.
    #[error("invalid signature")]
    InvalidToken,

    /// The merchant is not active.
    #[error("merchant is blocked")]
    TerminalBlocked,

    /// A live payment already exists for this `(merchant_key, order_id)` pair.
    #[error("duplicate order: existing payment {0}")]
    DuplicateOrder(String),

    /// The payment is not in a state that allows the requested operation.
    #[error("invalid state for this operation")]
    InvalidState,

    /// The state machine has no edge from `from` to `to`.
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Status the payment was in.
        from: PaymentStatus,
        /// Status the caller attempted to move it to.
        to: PaymentStatus,
    },

    /// Card details failed validation (mask, Luhn, expiry, CVV, holder name).
    #[error("invalid card: {0}")]
    InvalidCard(String),

    /// The payment's `expires_at` deadline has passed.
    #[error("payment expired")]
    Expired,

    /// The simulated bank rejected the attempt.
    #[error("bank rejected: {0}")]
    BankRejected(String),

    /// The simulated bank could not be reached after retrying.
    #[error("bank unavailable")]
    BankUnavailable,

    /// Optimistic-concurrency compare-and-swap lost the race.
    #[error("concurrent modification, retry")]
    ConcurrentModification,

    /// An invariant was violated; this indicates a bug, not bad input.
    #[error("internal error: {0}")]
    Internal(String),

    /// HTTP transport error talking to an external collaborator (e.g. notification delivery).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error from the persistence layer.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if the caller may usefully retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BankUnavailable | Error::ConcurrentModification | Error::Http(_))
    }

    /// The external error code from spec §6/§7, used by the HTTP layer to pick a status.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidToken => "INVALID_TOKEN",
            Error::TerminalBlocked => "TERMINAL_BLOCKED",
            Error::DuplicateOrder(_) => "DUPLICATE_ORDER",
            Error::InvalidState => "INVALID_STATE",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::InvalidCard(_) => "INVALID_CARD",
            Error::Expired => "EXPIRED",
            Error::BankRejected(_) => "BANK_REJECTED",
            Error::BankUnavailable => "BANK_UNAVAILABLE",
            Error::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Error::Internal(_) | Error::Http(_) | Error::Json(_) | Error::Config(_) => "INTERNAL",
            #[cfg(feature = "postgres")]
            Error::Database(_) => "INTERNAL",
        }
    }

    /// HTTP status code to surface this error as, per spec §6/§7.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidToken => 401,
            Error::TerminalBlocked => 403,
            Error::DuplicateOrder(_) => 409,
            Error::InvalidState | Error::InvalidTransition { .. } => 409,
            Error::InvalidCard(_) | Error::Expired => 400,
            Error::BankRejected(_) => 402,
            Error::BankUnavailable | Error::ConcurrentModification => 503,
            Error::Internal(_) | Error::Http(_) | Error::Json(_) | Error::Config(_) => 500,
            #[cfg(feature = "postgres")]
            Error::Database(_) => 500,
        }
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
