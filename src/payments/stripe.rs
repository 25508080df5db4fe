use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{
    CreateIntent, EventOrigin, Intent, IntentLookup, IntentStatus, PaymentError, PaymentProvider,
    WebhookEvent, signature,
};
use crate::models::PaymentProviderKind;

/// Client for a Stripe-compatible payment-intents API.
#[derive(Debug, Clone)]
pub struct StripeProvider {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    webhook_secret: String,
    tolerance_secs: u64,
}

#[derive(Debug, Deserialize)]
struct IntentBody {
    id: String,
    client_secret: Option<String>,
    status: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeProvider {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            tolerance_secs,
        }
    }

    fn decode(raw: Value) -> Result<Intent, PaymentError> {
        let body: IntentBody =
            serde_json::from_value(raw.clone()).map_err(|e| PaymentError::Decode(e.to_string()))?;
        let client_secret = body
            .client_secret
            .ok_or_else(|| PaymentError::Decode("intent has no client_secret".into()))?;
        Ok(Intent {
            id: body.id,
            client_secret,
            status: IntentStatus::parse(&body.status),
            amount_cents: body.amount,
            currency: body.currency,
            raw,
        })
    }

    async fn provider_error(response: reqwest::Response) -> PaymentError {
        let status = response.status().as_u16();
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message.unwrap_or_default(),
            Err(_) => String::new(),
        };
        PaymentError::Provider { status, message }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Stripe
    }

    async fn create_intent(&self, request: CreateIntent) -> Result<Intent, PaymentError> {
        let order_id = request.order_id.to_string();
        let amount = request.amount_cents.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("metadata[order_id]", order_id.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
        ];

        let mut builder = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.api_key)
            .form(&form);
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }
        let intent = Self::decode(response.json().await?)?;
        tracing::info!(intent_id = %intent.id, order_id = %order_id, "payment intent created");
        Ok(intent)
    }

    async fn retrieve_intent(&self, id: &str) -> Result<IntentLookup, PaymentError> {
        // References minted by the simulated provider never exist upstream.
        if !id.starts_with("pi_") {
            return Ok(IntentLookup::Stale {
                reason: format!("`{id}` is not a provider intent id"),
            });
        }

        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{id}", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(IntentLookup::NotFound);
        }
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let intent = Self::decode(response.json().await?)?;
        if intent.status.is_reusable() {
            Ok(IntentLookup::Found(intent))
        } else {
            Ok(IntentLookup::Stale {
                reason: format!("intent is {:?}", intent.status),
            })
        }
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookEvent, PaymentError> {
        let header =
            signature_header.ok_or_else(|| PaymentError::Signature("missing signature header".into()))?;
        signature::verify(
            payload,
            header,
            &self.webhook_secret,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;
        WebhookEvent::from_slice(payload, EventOrigin::Signed)
    }
}
