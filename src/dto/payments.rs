use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRetryResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub attempt: i32,
    pub max_attempts: i32,
    /// Advisory only; the server does not enforce it.
    pub retry_after_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct WebhookAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub idempotent: bool,
}

impl WebhookAck {
    pub fn applied() -> Self {
        Self {
            ok: true,
            idempotent: false,
        }
    }

    /// Already handled earlier; nothing changed this time.
    pub fn idempotent() -> Self {
        Self {
            ok: true,
            idempotent: true,
        }
    }
}
