use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::{AppConfig, PaymentConfig, PaymentMode},
    payments::{PaymentProvider, SimulatedProvider, StripeProvider},
    services::rate_calculator::RateTable,
    telemetry::Telemetry,
};

/// Checkout knobs that services read on every request.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub max_payment_retries: i32,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            max_payment_retries: 3,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub payments: Arc<dyn PaymentProvider>,
    pub rates: Arc<RateTable>,
    pub settings: Arc<CheckoutSettings>,
    pub telemetry: Telemetry,
}

impl AppState {
    pub fn new(
        orm: DatabaseConnection,
        payments: Arc<dyn PaymentProvider>,
        rates: RateTable,
        settings: CheckoutSettings,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            orm,
            payments,
            rates: Arc::new(rates),
            settings: Arc::new(settings),
            telemetry,
        }
    }

    pub fn from_config(
        orm: DatabaseConnection,
        config: &AppConfig,
        rates: RateTable,
        telemetry: Telemetry,
    ) -> Self {
        let settings = CheckoutSettings {
            currency: config.currency.clone(),
            max_payment_retries: config.payment.max_retries,
        };
        Self::new(orm, provider_for(&config.payment), rates, settings, telemetry)
    }
}

pub fn provider_for(config: &PaymentConfig) -> Arc<dyn PaymentProvider> {
    match (config.mode, &config.api_key, &config.webhook_secret) {
        (PaymentMode::Live, Some(key), Some(secret)) => Arc::new(StripeProvider::new(
            config.api_base.clone(),
            key.clone(),
            secret.clone(),
            config.webhook_tolerance_secs,
        )),
        _ => Arc::new(SimulatedProvider::new()),
    }
}
