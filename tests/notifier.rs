//! Webhook delivery test using `wiremock`, the same offline HTTP mocking
//! tool the teacher's own `tests/mock_api.rs` uses for its outbound API
//! calls, applied here to the gateway's own outbound notification POST.

mod common;

use common::{good_card, TestContext};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn confirmed_payment_delivers_webhook_notification() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = TestContext::new();
    let mut intent = ctx.sample_intent("o-webhook");
    intent.notification_url = Some(format!("{}/webhook", mock_server.uri()));
    let token = ctx.sign_intent(&intent);

    let init = ctx.service.init(intent, &token).await.unwrap();
    ctx.service.accept_card(&init.payment_id, good_card()).await.unwrap();

    // Delivery runs on a spawned task; give it a moment to land.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    mock_server.verify().await;
}
