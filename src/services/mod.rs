pub mod discount_service;
pub mod inventory_ledger;
pub mod order_events;
pub mod order_service;
pub mod payment_intent_service;
pub mod product_metrics;
pub mod rate_calculator;
pub mod webhook_service;
