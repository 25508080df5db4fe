//! Payment provider capability: create/retrieve intents and turn raw webhook
//! deliveries into typed events.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::PaymentProviderKind;

pub mod signature;
pub mod simulated;
pub mod stripe;
pub mod webhook;

pub use simulated::SimulatedProvider;
pub use stripe::StripeProvider;
pub use webhook::{EventOrigin, IntentRef, PaymentEvent, WebhookEvent};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payment provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("unexpected provider response: {0}")]
    Decode(String),

    #[error("webhook signature rejected: {0}")]
    Signature(String),

    #[error("malformed webhook payload: {0}")]
    Payload(String),
}

#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    /// Forwarded to the provider so a retried HTTP call cannot mint two intents.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    RequiresPayment,
    Processing,
    RequiresCapture,
    Succeeded,
    Canceled,
}

impl IntentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => IntentStatus::Processing,
            "requires_capture" => IntentStatus::RequiresCapture,
            "succeeded" => IntentStatus::Succeeded,
            "canceled" => IntentStatus::Canceled,
            // requires_payment_method, requires_confirmation, requires_action
            _ => IntentStatus::RequiresPayment,
        }
    }

    /// A client can still complete payment against it.
    pub fn is_reusable(&self) -> bool {
        !matches!(self, IntentStatus::Succeeded | IntentStatus::Canceled)
    }
}

#[derive(Debug, Clone)]
pub struct Intent {
    pub id: String,
    pub client_secret: String,
    pub status: IntentStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub raw: Value,
}

/// Outcome of looking up a stored provider reference.
#[derive(Debug, Clone)]
pub enum IntentLookup {
    Found(Intent),
    NotFound,
    /// The reference exists but cannot be reused (placeholder from another
    /// mode, cancelled, or amount drift).
    Stale { reason: String },
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> PaymentProviderKind;

    async fn create_intent(&self, request: CreateIntent) -> Result<Intent, PaymentError>;

    async fn retrieve_intent(&self, id: &str) -> Result<IntentLookup, PaymentError>;

    /// Authenticate and decode a webhook delivery.
    fn parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, PaymentError>;
}
