use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Order, OrderEvent, OrderItem, PaymentRecord};

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<PaymentRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderTimeline {
    pub items: Vec<OrderEvent>,
}
