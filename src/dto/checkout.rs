use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    models::Address,
    services::rate_calculator::{Destination, RateQuote},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    pub size: Option<String>,
    pub quantity: i32,
    /// Price the shopper saw; informational, the product row is authoritative.
    pub price_cents_snapshot: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub email: String,
    pub lines: Vec<CartLine>,
    pub shipping_address: Address,
    pub discount_code: Option<String>,
    /// Alternative to the `Idempotency-Key` header.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub replayed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RateQuoteRequest {
    pub lines: Vec<CartLine>,
    pub destination: Destination,
    /// Priced as checkout would price it, but not redeemed.
    pub discount_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RateQuoteResponse {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub quote: RateQuote,
}
