use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    order_events::Model as OrderEventModel, order_items::Model as OrderItemModel,
    orders::Model as OrderModel, payment_records::Model as PaymentRecordModel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    AwaitingPayment,
    Paid,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// States from which a payment outcome may still be applied.
    pub const PRE_PAYMENT: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::AwaitingPayment];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::AwaitingPayment => "AWAITING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    pub fn is_pre_payment(&self) -> bool {
        Self::PRE_PAYMENT.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    pub fn pre_payment_strs() -> Vec<&'static str> {
        Self::PRE_PAYMENT.iter().map(|s| s.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    PaymentPending,
    Authorized,
    Captured,
    Failed,
}

impl PaymentStatus {
    /// Records in these states hold the order's live intent.
    pub const LIVE: [PaymentStatus; 2] = [PaymentStatus::PaymentPending, PaymentStatus::Authorized];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::PaymentPending => "PAYMENT_PENDING",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn live_strs() -> Vec<&'static str> {
        Self::LIVE.iter().map(|s| s.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventKind {
    OrderCreated,
    DiscountApplied,
    PaymentIntentCreated,
    PaymentRetryAttempt,
    PaymentAwaiting,
    PaymentSucceeded,
    PaymentFailed,
    StockRestored,
    Note,
    SystemEvent,
}

impl OrderEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventKind::OrderCreated => "ORDER_CREATED",
            OrderEventKind::DiscountApplied => "DISCOUNT_APPLIED",
            OrderEventKind::PaymentIntentCreated => "PAYMENT_INTENT_CREATED",
            OrderEventKind::PaymentRetryAttempt => "PAYMENT_RETRY_ATTEMPT",
            OrderEventKind::PaymentAwaiting => "PAYMENT_AWAITING",
            OrderEventKind::PaymentSucceeded => "PAYMENT_SUCCEEDED",
            OrderEventKind::PaymentFailed => "PAYMENT_FAILED",
            OrderEventKind::StockRestored => "STOCK_RESTORED",
            OrderEventKind::Note => "NOTE",
            OrderEventKind::SystemEvent => "SYSTEM_EVENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProviderKind {
    Stripe,
    Simulated,
}

impl PaymentProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProviderKind::Stripe => "stripe",
            PaymentProviderKind::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! impl_from_str {
    ($ty:ty, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownVariant(s.to_string()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_from_str!(
    OrderStatus,
    [
        OrderStatus::Pending,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ]
);
impl_from_str!(
    PaymentStatus,
    [
        PaymentStatus::PaymentPending,
        PaymentStatus::Authorized,
        PaymentStatus::Captured,
        PaymentStatus::Failed,
    ]
);
impl_from_str!(
    OrderEventKind,
    [
        OrderEventKind::OrderCreated,
        OrderEventKind::DiscountApplied,
        OrderEventKind::PaymentIntentCreated,
        OrderEventKind::PaymentRetryAttempt,
        OrderEventKind::PaymentAwaiting,
        OrderEventKind::PaymentSucceeded,
        OrderEventKind::PaymentFailed,
        OrderEventKind::StockRestored,
        OrderEventKind::Note,
        OrderEventKind::SystemEvent,
    ]
);

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub email: String,
    pub discount_code: Option<String>,
    #[schema(value_type = Object)]
    pub shipping_address: Value,
    pub payment_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn totals_consistent(&self) -> bool {
        self.total_cents
            == self.subtotal_cents - self.discount_cents + self.tax_cents + self.shipping_cents
            && self.total_cents >= 0
    }
}

impl From<OrderModel> for Order {
    fn from(model: OrderModel) -> Self {
        Order {
            id: model.id,
            user_id: model.user_id,
            status: model.status,
            subtotal_cents: model.subtotal_cents,
            discount_cents: model.discount_cents,
            tax_cents: model.tax_cents,
            shipping_cents: model.shipping_cents,
            total_cents: model.total_cents,
            currency: model.currency,
            email: model.email,
            discount_code: model.discount_code,
            shipping_address: model.shipping_address,
            payment_attempts: model.payment_attempts,
            created_at: model.created_at.with_timezone(&Utc),
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
            shipped_at: model.shipped_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub size: Option<String>,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl From<OrderItemModel> for OrderItem {
    fn from(model: OrderItemModel) -> Self {
        OrderItem {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            variant_id: model.variant_id,
            size: model.size,
            quantity: model.quantity,
            unit_price_cents: model.unit_price_cents,
            line_total_cents: model.line_total_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub provider_ref: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentRecordModel> for PaymentRecord {
    fn from(model: PaymentRecordModel) -> Self {
        PaymentRecord {
            id: model.id,
            order_id: model.order_id,
            provider: model.provider,
            provider_ref: model.provider_ref,
            amount_cents: model.amount_cents,
            currency: model.currency,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderEvent {
    pub id: i64,
    pub order_id: Uuid,
    pub kind: String,
    pub message: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<OrderEventModel> for OrderEvent {
    fn from(model: OrderEventModel) -> Self {
        OrderEvent {
            id: model.id,
            order_id: model.order_id,
            kind: model.kind,
            message: model.message,
            meta: model.meta,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip_through_from_str() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::AwaitingPayment,
            OrderStatus::Paid,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn only_pending_and_awaiting_are_pre_payment() {
        assert!(OrderStatus::Pending.is_pre_payment());
        assert!(OrderStatus::AwaitingPayment.is_pre_payment());
        assert!(!OrderStatus::Paid.is_pre_payment());
        assert!(!OrderStatus::Cancelled.is_pre_payment());
        assert!(OrderStatus::Cancelled.is_terminal());
    }
}
