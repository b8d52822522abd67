//! axum router and handlers.

use super::dto::*;
use crate::bank::CardDetails;
use crate::error::Error;
use crate::service::PaymentService;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct ServerState {
    pub service: Arc<PaymentService>,
}

pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(service: Arc<PaymentService>) -> Self {
        let state = ServerState { service };
        let router = Router::new()
            .route("/payments", post(init_handler))
            .route("/payments/:id/accept-card", post(accept_card_handler))
            .route("/payments/:id/3ds", post(submit_3ds_handler))
            .route("/payments/:id/confirm", post(confirm_handler))
            .route("/payments/:id/cancel", post(cancel_handler))
            .route("/payments/:id", get(get_handler))
            .route("/orders", get(check_order_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(RequestBodyLimitLayer::new(64 * 1024)))
            .with_state(state);
        Self { router }
    }

    pub fn router(self) -> Router {
        self.router
    }

    /// Serves the router, shutting down gracefully on SIGINT/SIGTERM,
    /// matching `WebhookServer::run_with_shutdown`'s shape.
    pub async fn run(self, addr: SocketAddr) -> crate::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| Error::Config(e.to_string()))?;
        tracing::info!(%addr, "gatekit listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { code: self.code(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

async fn init_handler(State(state): State<ServerState>, Json(req): Json<InitRequest>) -> Response {
    let token = req.token.clone();
    let intent = req.into_intent();
    match state.service.init(intent, &token).await {
        Ok(result) => Json(InitResponse {
            payment_id: result.payment_id,
            status: result.status,
            payment_url: result.payment_url,
            expires_at: result.expires_at,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn accept_card_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(req): Json<AcceptCardRequest>,
) -> Response {
    let card = CardDetails { number: req.card_number, expiry: req.expiry, cvv: req.cvv, holder: req.holder };
    match state.service.accept_card(&id, card).await {
        Ok(result) => Json(AcceptCardResponse { status: result.status, challenge_handle: result.challenge_handle }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn submit_3ds_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(req): Json<Submit3DSRequest>,
) -> Response {
    match state.service.submit_3ds(&id, &req.otp).await {
        Ok(result) => Json(AcceptCardResponse { status: result.status, challenge_handle: result.challenge_handle }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn confirm_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(req): Json<TokenOnlyRequest>,
) -> Response {
    match state.service.confirm(&id, &req.token).await {
        Ok(status) => Json(StatusResponse { status }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn cancel_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Response {
    match state.service.cancel(&id, &req.token, req.amount).await {
        Ok(result) => Json(CancelResponse { status: result.status, refunded_amount: result.refunded_amount }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_handler(State(state): State<ServerState>, Path(id): Path<String>, Query(q): Query<GetQuery>) -> Response {
    match state.service.get(&id, &q.token).await {
        Ok(view) => Json(GetResponse { view }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn check_order_handler(State(state): State<ServerState>, Query(q): Query<CheckOrderQuery>) -> Response {
    match state.service.check_order(&q.merchant_key, &q.order_id, &q.token).await {
        Ok(payments) => Json(CheckOrderResponse { payments }).into_response(),
        Err(err) => err.into_response(),
    }
}
