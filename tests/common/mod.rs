#![allow(dead_code)]

use std::sync::Arc;

use checkout_core::{
    db::{create_orm_conn, sync_schema},
    dto::checkout::CartLine,
    entity::{
        discount_codes::ActiveModel as DiscountActive,
        products::{ActiveModel as ProductActive, Model as ProductModel},
        size_variants::{ActiveModel as VariantActive, Model as VariantModel},
    },
    models::Address,
    payments::SimulatedProvider,
    services::{
        order_service::{self, CartOwner, CartSnapshot, CreateOrder, CreatedOrder},
        rate_calculator::RateTable,
    },
    state::{AppState, CheckoutSettings},
    telemetry::Telemetry,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

pub struct TestApp {
    pub state: AppState,
    /// Same instance the state talks to, for steering intent behavior.
    pub provider: Arc<SimulatedProvider>,
}

/// Fresh in-memory database per call.
pub async fn setup() -> anyhow::Result<TestApp> {
    let orm = create_orm_conn("sqlite::memory:").await?;
    sync_schema(&orm).await?;

    let provider = Arc::new(SimulatedProvider::new());
    let state = AppState::new(
        orm,
        provider.clone(),
        RateTable::default(),
        CheckoutSettings::default(),
        Telemetry::new(),
    );
    Ok(TestApp { state, provider })
}

pub async fn seed_product(
    state: &AppState,
    name: &str,
    price_cents: i64,
    sizes: &[(&str, i32)],
) -> anyhow::Result<(ProductModel, Vec<VariantModel>)> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        price_cents: Set(price_cents),
        active: Set(true),
        deleted_at: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    let mut variants = Vec::new();
    for (label, stock) in sizes {
        let variant = VariantActive {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            label: Set(label.to_string()),
            stock: Set(*stock),
            created_at: Set(Utc::now().into()),
        }
        .insert(&state.orm)
        .await?;
        variants.push(variant);
    }
    Ok((product, variants))
}

pub async fn seed_percent_discount(
    state: &AppState,
    code: &str,
    percent: i32,
    max_uses: Option<i32>,
) -> anyhow::Result<()> {
    DiscountActive {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        kind: Set("percent".to_string()),
        percent: Set(Some(percent)),
        amount_cents: Set(None),
        active: Set(true),
        expires_at: Set(None),
        max_uses: Set(max_uses),
        used_count: Set(0),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(())
}

pub fn california() -> Address {
    Address {
        name: "Ada Lovelace".into(),
        line1: "1 Market St".into(),
        line2: None,
        city: "San Francisco".into(),
        region: Some("CA".into()),
        postal_code: Some("94105".into()),
        country: "US".into(),
    }
}

pub fn line(product_id: Uuid, size: Option<&str>, quantity: i32) -> CartLine {
    CartLine {
        product_id,
        size: size.map(str::to_string),
        quantity,
        price_cents_snapshot: None,
    }
}

pub fn guest_order(lines: Vec<CartLine>) -> CreateOrder {
    CreateOrder {
        cart: CartSnapshot {
            owner: CartOwner::Guest("session-1".into()),
            lines,
        },
        email: "ada@example.com".into(),
        shipping_address: california(),
        discount_code: None,
        idempotency_key: None,
    }
}

pub async fn place_order(state: &AppState, lines: Vec<CartLine>) -> anyhow::Result<CreatedOrder> {
    Ok(order_service::create_order(state, guest_order(lines)).await?)
}

pub fn success_event(event_id: &str, order_id: Uuid, amount_cents: i64) -> Vec<u8> {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": format!("pi_{}", order_id.simple()),
            "amount": amount_cents,
            "metadata": { "order_id": order_id.to_string() }
        }}
    })
    .to_string()
    .into_bytes()
}

pub fn failure_event(event_id: &str, order_id: Uuid) -> Vec<u8> {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.payment_failed",
        "data": { "object": {
            "id": format!("pi_{}", order_id.simple()),
            "metadata": { "order_id": order_id.to_string() },
            "last_payment_error": { "message": "Your card was declined." }
        }}
    })
    .to_string()
    .into_bytes()
}
