//! Process-level tracing setup and the counters handed to services through
//! [`AppState`](crate::state::AppState).

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::ToSchema;

/// Install the global subscriber. Call once per process; the returned guard
/// logs the final counter snapshot when dropped.
pub fn init(default_filter: &str, telemetry: Telemetry) -> anyhow::Result<TelemetryGuard> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(TelemetryGuard { telemetry })
}

pub struct TelemetryGuard {
    telemetry: Telemetry,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let snapshot = self.telemetry.snapshot();
        tracing::info!(?snapshot, "telemetry shutdown");
    }
}

#[derive(Debug, Default)]
struct Counters {
    orders_created: AtomicU64,
    orders_rejected: AtomicU64,
    checkout_micros: AtomicU64,
    intents_created: AtomicU64,
    intents_reused: AtomicU64,
    payment_retries: AtomicU64,
    webhooks_applied: AtomicU64,
    webhooks_duplicate: AtomicU64,
    webhooks_rejected: AtomicU64,
    stock_restored: AtomicU64,
}

/// Cheap to clone; all clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    counters: Arc<Counters>,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub orders_created: u64,
    pub orders_rejected: u64,
    pub avg_checkout_ms: u64,
    pub intents_created: u64,
    pub intents_reused: u64,
    pub payment_retries: u64,
    pub webhooks_applied: u64,
    pub webhooks_duplicate: u64,
    pub webhooks_rejected: u64,
    pub stock_restored: u64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_created(&self, latency: Duration) {
        self.counters.orders_created.fetch_add(1, Ordering::Relaxed);
        self.counters
            .checkout_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn order_rejected(&self, code: &str) {
        self.counters.orders_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(code, "checkout rejected");
    }

    pub fn intent_created(&self) {
        self.counters.intents_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn intent_reused(&self) {
        self.counters.intents_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payment_retried(&self) {
        self.counters.payment_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_applied(&self) {
        self.counters.webhooks_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_duplicate(&self) {
        self.counters
            .webhooks_duplicate
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_rejected(&self) {
        self.counters.webhooks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stock_restored(&self, units: u64) {
        self.counters.stock_restored.fetch_add(units, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let c = &self.counters;
        let orders_created = c.orders_created.load(Ordering::Relaxed);
        let checkout_micros = c.checkout_micros.load(Ordering::Relaxed);
        TelemetrySnapshot {
            orders_created,
            orders_rejected: c.orders_rejected.load(Ordering::Relaxed),
            avg_checkout_ms: checkout_micros
                .checked_div(orders_created)
                .map(|us| us / 1000)
                .unwrap_or(0),
            intents_created: c.intents_created.load(Ordering::Relaxed),
            intents_reused: c.intents_reused.load(Ordering::Relaxed),
            payment_retries: c.payment_retries.load(Ordering::Relaxed),
            webhooks_applied: c.webhooks_applied.load(Ordering::Relaxed),
            webhooks_duplicate: c.webhooks_duplicate.load(Ordering::Relaxed),
            webhooks_rejected: c.webhooks_rejected.load(Ordering::Relaxed),
            stock_restored: c.stock_restored.load(Ordering::Relaxed),
        }
    }
}
