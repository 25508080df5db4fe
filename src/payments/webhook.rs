//! Webhook deliveries are resolved into [`WebhookEvent`] once, at ingestion.
//! Everything downstream matches on [`PaymentEvent`] instead of poking at JSON.

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::PaymentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Signature verified against the configured secret.
    Signed,
    /// Accepted unsigned because the provider runs in simulated mode.
    Simulated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentRef {
    pub intent_id: Option<String>,
    pub order_id: Option<Uuid>,
    pub amount_cents: Option<i64>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded(IntentRef),
    Failed(IntentRef),
    /// Processing or authorized-awaiting-capture.
    Awaiting { intent: IntentRef, authorized: bool },
    Ignored,
}

impl PaymentEvent {
    pub fn intent(&self) -> Option<&IntentRef> {
        match self {
            PaymentEvent::Succeeded(intent)
            | PaymentEvent::Failed(intent)
            | PaymentEvent::Awaiting { intent, .. } => Some(intent),
            PaymentEvent::Ignored => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: Option<String>,
    pub event_type: String,
    pub origin: EventOrigin,
    pub payment: PaymentEvent,
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: Option<EnvelopeData>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: IntentObject,
}

#[derive(Debug, Default, Deserialize)]
struct IntentObject {
    id: Option<String>,
    amount: Option<i64>,
    #[serde(default)]
    metadata: Value,
    last_payment_error: Option<PaymentErrorObject>,
}

#[derive(Debug, Deserialize)]
struct PaymentErrorObject {
    message: Option<String>,
}

/// Flat shape emitted by test harnesses in simulated mode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedBody {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(alias = "order_id")]
    order_id: Option<Uuid>,
    #[serde(alias = "payment_intent_id")]
    payment_intent_id: Option<String>,
    amount_cents: Option<i64>,
    message: Option<String>,
}

impl WebhookEvent {
    pub fn from_slice(payload: &[u8], origin: EventOrigin) -> Result<Self, PaymentError> {
        let raw: Value =
            serde_json::from_slice(payload).map_err(|e| PaymentError::Payload(e.to_string()))?;

        let is_envelope = raw.get("data").is_some_and(|d| d.get("object").is_some());
        if is_envelope || origin == EventOrigin::Signed {
            let envelope: Envelope = serde_json::from_value(raw.clone())
                .map_err(|e| PaymentError::Payload(e.to_string()))?;
            let object = envelope.data.map(|d| d.object).unwrap_or_default();
            let intent = IntentRef {
                intent_id: object.id,
                order_id: object
                    .metadata
                    .get("order_id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok()),
                amount_cents: object.amount,
                failure_message: object.last_payment_error.and_then(|e| e.message),
            };
            return Ok(Self {
                id: envelope.id,
                payment: classify(&envelope.event_type, intent),
                event_type: envelope.event_type,
                origin,
                raw,
            });
        }

        let body: SimulatedBody = serde_json::from_value(raw.clone())
            .map_err(|e| PaymentError::Payload(e.to_string()))?;
        let intent = IntentRef {
            intent_id: body.payment_intent_id,
            order_id: body.order_id,
            amount_cents: body.amount_cents,
            failure_message: body.message,
        };
        Ok(Self {
            id: body.id,
            payment: classify(&body.event_type, intent),
            event_type: body.event_type,
            origin,
            raw,
        })
    }
}

fn classify(event_type: &str, intent: IntentRef) -> PaymentEvent {
    match event_type {
        "payment_intent.succeeded" | "payment.succeeded" => PaymentEvent::Succeeded(intent),
        "payment_intent.payment_failed" | "payment_intent.canceled" | "payment.failed" => {
            PaymentEvent::Failed(intent)
        }
        "payment_intent.processing" => PaymentEvent::Awaiting {
            intent,
            authorized: false,
        },
        "payment_intent.amount_capturable_updated" => PaymentEvent::Awaiting {
            intent,
            authorized: true,
        },
        _ => PaymentEvent::Ignored,
    }
}
