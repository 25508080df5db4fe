use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::json;

use super::{
    CreateIntent, EventOrigin, Intent, IntentLookup, IntentStatus, PaymentError, PaymentProvider,
    WebhookEvent,
};
use crate::models::PaymentProviderKind;

/// Gateway-less provider: intents live in process memory and webhooks are
/// accepted as unsigned JSON. For local runs and integration tests only.
#[derive(Debug, Default)]
pub struct SimulatedProvider {
    intents: Mutex<HashMap<String, Intent>>,
    sequence: AtomicU64,
    fail_next_create: AtomicBool,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_intent` call fail like an unreachable gateway.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    /// Drop every known intent, as after a process restart.
    pub fn forget_all(&self) {
        if let Ok(mut intents) = self.intents.lock() {
            intents.clear();
        }
    }

    pub fn set_status(&self, id: &str, status: IntentStatus) {
        if let Ok(mut intents) = self.intents.lock() {
            if let Some(intent) = intents.get_mut(id) {
                intent.status = status;
            }
        }
    }

    fn store(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Intent>>, PaymentError> {
        self.intents
            .lock()
            .map_err(|_| PaymentError::Decode("simulated intent store poisoned".into()))
    }
}

#[async_trait]
impl PaymentProvider for SimulatedProvider {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Simulated
    }

    async fn create_intent(&self, request: CreateIntent) -> Result<Intent, PaymentError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::Provider {
                status: 503,
                message: "simulated gateway unavailable".into(),
            });
        }

        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("sim_pi_{}_{n}", request.order_id.simple());
        let intent = Intent {
            client_secret: format!("{id}_secret"),
            status: IntentStatus::RequiresPayment,
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
            raw: json!({
                "id": id,
                "amount": request.amount_cents,
                "currency": request.currency,
                "metadata": { "order_id": request.order_id.to_string() },
                "simulated": true,
            }),
            id,
        };
        self.store()?.insert(intent.id.clone(), intent.clone());
        tracing::debug!(intent_id = %intent.id, order_id = %request.order_id, "simulated intent created");
        Ok(intent)
    }

    async fn retrieve_intent(&self, id: &str) -> Result<IntentLookup, PaymentError> {
        let lookup = match self.store()?.get(id) {
            Some(intent) if intent.status.is_reusable() => IntentLookup::Found(intent.clone()),
            Some(intent) => IntentLookup::Stale {
                reason: format!("intent is {:?}", intent.status),
            },
            None => IntentLookup::NotFound,
        };
        Ok(lookup)
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        _signature: Option<&str>,
    ) -> Result<WebhookEvent, PaymentError> {
        WebhookEvent::from_slice(payload, EventOrigin::Simulated)
    }
}
