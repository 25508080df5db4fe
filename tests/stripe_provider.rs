use checkout_core::payments::{
    CreateIntent, IntentLookup, IntentStatus, PaymentError, PaymentEvent, PaymentProvider,
    StripeProvider, signature,
};
use serde_json::json;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

const SECRET: &str = "whsec_test";

fn provider(server: &MockServer) -> StripeProvider {
    StripeProvider::new(server.uri(), "sk_test_123", SECRET, 300)
}

#[tokio::test]
async fn create_intent_posts_form_with_idempotency_key() {
    let server = MockServer::start().await;
    let order_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(header("idempotency-key", format!("order-{order_id}").as_str()))
        .and(body_string_contains("amount=2086"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_123",
            "client_secret": "pi_123_secret_abc",
            "status": "requires_payment_method",
            "amount": 2086,
            "currency": "usd"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let intent = provider(&server)
        .create_intent(CreateIntent {
            order_id,
            amount_cents: 2086,
            currency: "usd".into(),
            idempotency_key: Some(format!("order-{order_id}")),
        })
        .await
        .unwrap();

    assert_eq!(intent.id, "pi_123");
    assert_eq!(intent.client_secret, "pi_123_secret_abc");
    assert_eq!(intent.status, IntentStatus::RequiresPayment);
    assert_eq!(intent.amount_cents, 2086);
}

#[tokio::test]
async fn provider_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": { "message": "Amount must be at least 50 cents" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .create_intent(CreateIntent {
            order_id: Uuid::new_v4(),
            amount_cents: 10,
            currency: "usd".into(),
            idempotency_key: None,
        })
        .await
        .unwrap_err();

    match err {
        PaymentError::Provider { status, message } => {
            assert_eq!(status, 402);
            assert!(message.contains("50 cents"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn retrieve_distinguishes_live_finished_and_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_live",
            "client_secret": "pi_live_secret",
            "status": "requires_payment_method",
            "amount": 500,
            "currency": "usd"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_done"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_done",
            "client_secret": "pi_done_secret",
            "status": "succeeded",
            "amount": 500,
            "currency": "usd"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "No such payment_intent" }
        })))
        .mount(&server)
        .await;

    let stripe = provider(&server);
    assert!(matches!(
        stripe.retrieve_intent("pi_live").await.unwrap(),
        IntentLookup::Found(ref intent) if intent.id == "pi_live"
    ));
    assert!(matches!(
        stripe.retrieve_intent("pi_done").await.unwrap(),
        IntentLookup::Stale { .. }
    ));
    assert!(matches!(
        stripe.retrieve_intent("pi_gone").await.unwrap(),
        IntentLookup::NotFound
    ));
    // Simulated references are never sent upstream.
    assert!(matches!(
        stripe.retrieve_intent("sim_pi_abc_1").await.unwrap(),
        IntentLookup::Stale { .. }
    ));
}

#[tokio::test]
async fn signed_webhook_is_verified_and_decoded() {
    let server = MockServer::start().await;
    let stripe = provider(&server);
    let order_id = Uuid::new_v4();
    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": "pi_1",
            "amount": 2086,
            "metadata": { "order_id": order_id.to_string() }
        }}
    })
    .to_string();

    let header_value =
        signature::sign(payload.as_bytes(), SECRET, chrono::Utc::now().timestamp()).unwrap();
    let event = stripe
        .parse_webhook(payload.as_bytes(), Some(&header_value))
        .unwrap();
    assert!(matches!(
        event.payment,
        PaymentEvent::Succeeded(ref intent) if intent.order_id == Some(order_id)
    ));

    let tampered = payload.replace("2086", "1");
    assert!(matches!(
        stripe.parse_webhook(tampered.as_bytes(), Some(&header_value)),
        Err(PaymentError::Signature(_))
    ));
    assert!(matches!(
        stripe.parse_webhook(payload.as_bytes(), None),
        Err(PaymentError::Signature(_))
    ));
}
