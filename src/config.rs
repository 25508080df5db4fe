use std::env;

use anyhow::{Context, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    /// No gateway: intents are issued locally and webhooks arrive as unsigned JSON.
    Simulated,
    Live,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub mode: PaymentMode,
    pub api_base: String,
    pub api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_secs: u64,
    pub max_retries: i32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub currency: String,
    pub rate_table_path: Option<String>,
    pub payment: PaymentConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let currency = env::var("STORE_CURRENCY")
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|_| "usd".to_string());
        let rate_table_path = env::var("RATE_TABLE_PATH").ok().filter(|p| !p.is_empty());

        let mode = match env::var("PAYMENT_MODE").as_deref() {
            Ok("live") => PaymentMode::Live,
            Ok("simulated") | Err(_) => PaymentMode::Simulated,
            Ok(other) => bail!("PAYMENT_MODE must be `simulated` or `live`, got `{other}`"),
        };
        let payment = PaymentConfig {
            mode,
            api_base: env::var("PAYMENT_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            api_key: env::var("PAYMENT_API_KEY").ok(),
            webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET").ok(),
            webhook_tolerance_secs: env::var("PAYMENT_WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            max_retries: env::var("PAYMENT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        };

        if payment.mode == PaymentMode::Live {
            if payment.api_key.is_none() {
                bail!("PAYMENT_API_KEY is required when PAYMENT_MODE=live");
            }
            if payment.webhook_secret.is_none() {
                bail!("PAYMENT_WEBHOOK_SECRET is required when PAYMENT_MODE=live");
            }
        }

        Ok(Self {
            port,
            database_url,
            host,
            currency,
            rate_table_path,
            payment,
        })
    }
}
