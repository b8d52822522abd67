//! Webhook notification delivery.
//!
//! Every persisted terminal-or-user-visible transition enqueues an
//! asynchronous POST to `intent.notification_url`. Implemented as a bounded
//! `mpsc` channel plus a drain task that spawns one delivery job per
//! notification: outbound delivery instead of inbound receipt, run through
//! the same `reqwest::Client` + exponential-backoff retry idiom used for
//! outbound HTTP elsewhere in this crate, generalized to a fire-and-forget
//! queue instead of a caller-awaited request.

use crate::signer::{ScalarParams, Signer};
use crate::state_machine::PaymentStatus;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

const MAX_ATTEMPTS: u32 = 8;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub payment_id: String,
    pub merchant_key: String,
    pub order_id: String,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub url: String,
    pub merchant_secret: String,
    pub payload: WebhookPayload,
}

/// Enqueues outbound webhook deliveries; cloned cheaply, held by
/// `PaymentService` and the expiry sweeper.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::Sender<NotificationJob>,
}

impl Notifier {
    /// Spawns the drain task and returns a handle. `buffer` bounds the
    /// channel the same way `WebhookServerConfig::with_channel_buffer` does.
    pub fn spawn(http: reqwest::Client, buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        tokio::spawn(drain(http, receiver));
        Self { sender }
    }

    pub async fn notify(&self, job: NotificationJob) {
        if job.url.is_empty() {
            return;
        }
        if self.sender.send(job).await.is_err() {
            tracing::warn!("notifier channel closed, dropping webhook delivery");
        }
    }
}

async fn drain(http: reqwest::Client, mut receiver: mpsc::Receiver<NotificationJob>) {
    while let Some(job) = receiver.recv().await {
        let http = http.clone();
        tokio::spawn(async move {
            deliver_with_retry(&http, job).await;
        });
    }
}

async fn deliver_with_retry(http: &reqwest::Client, job: NotificationJob) {
    let body = serde_json::to_value(&job.payload).unwrap_or(serde_json::Value::Null);
    let params = crate::signer::scalars_from_json(&body);
    let token = sign_body(&params, &job.merchant_secret);

    let mut envelope = body.clone();
    if let serde_json::Value::Object(ref mut map) = envelope {
        map.insert("token".to_string(), serde_json::Value::String(token));
    }

    for attempt in 0..MAX_ATTEMPTS {
        match http.post(&job.url).json(&envelope).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(payment_id = %job.payload.payment_id, attempt, "webhook delivered");
                return;
            }
            Ok(resp) => {
                tracing::warn!(
                    payment_id = %job.payload.payment_id,
                    status = %resp.status(),
                    attempt,
                    "webhook delivery rejected"
                );
            }
            Err(err) => {
                tracing::warn!(payment_id = %job.payload.payment_id, error = %err, attempt, "webhook delivery failed");
            }
        }

        let backoff = std::cmp::min(BASE_BACKOFF * 2u32.pow(attempt), MAX_BACKOFF);
        tokio::time::sleep(backoff).await;
    }

    tracing::error!(payment_id = %job.payload.payment_id, "webhook delivery exhausted all attempts");
}

fn sign_body(params: &ScalarParams, secret: &str) -> String {
    Signer::sign(params, secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_is_a_no_op_for_empty_url() {
        let notifier = Notifier::spawn(reqwest::Client::new(), 4);
        notifier
            .notify(NotificationJob {
                url: String::new(),
                merchant_secret: "s".to_string(),
                payload: WebhookPayload {
                    payment_id: "p1".to_string(),
                    merchant_key: "m1".to_string(),
                    order_id: "o1".to_string(),
                    status: PaymentStatus::Confirmed,
                    amount: 1000,
                    currency: "RUB".to_string(),
                },
            })
            .await;
    }
}
