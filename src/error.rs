use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    payments::PaymentError,
    response::{ApiResponse, Meta},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for product {product_id}")]
    OutOfStock {
        product_id: Uuid,
        variant_id: Option<Uuid>,
        size: Option<String>,
        requested: i32,
    },

    #[error("Product {product_id} is unavailable: {reason}")]
    ProductUnavailable { product_id: Uuid, reason: String },

    #[error("Invalid discount code: {0}")]
    InvalidDiscount(String),

    #[error("Order {order_id} is {status}")]
    InvalidOrderState { order_id: Uuid, status: String },

    #[error("Maximum payment retries exceeded ({max})")]
    MaxRetriesExceeded { max: i32 },

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Payment provider error")]
    Payment(#[from] PaymentError),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable code the frontend maps to a message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::EmptyCart => "EMPTY_CART",
            AppError::OutOfStock { .. } => "OUT_OF_STOCK",
            AppError::ProductUnavailable { .. } => "PRODUCT_UNAVAILABLE",
            AppError::InvalidDiscount(_) => "INVALID_DISCOUNT",
            AppError::InvalidOrderState { .. } => "INVALID_ORDER_STATE",
            AppError::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
            AppError::InvalidSignature(_) => "INVALID_SIGNATURE",
            AppError::Payment(_) => "PAYMENT_PROVIDER_ERROR",
            AppError::OrmError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::EmptyCart
            | AppError::ProductUnavailable { .. }
            | AppError::InvalidDiscount(_) => StatusCode::BAD_REQUEST,
            AppError::OutOfStock { .. }
            | AppError::InvalidOrderState { .. }
            | AppError::MaxRetriesExceeded { .. } => StatusCode::CONFLICT,
            AppError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            AppError::Payment(_) => StatusCode::BAD_GATEWAY,
            AppError::OrmError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Provider failures leave the order PENDING, so the caller may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Payment(_))
    }

    fn detail(&self) -> Option<Value> {
        match self {
            AppError::OutOfStock {
                product_id,
                variant_id,
                size,
                requested,
            } => Some(serde_json::json!({
                "product_id": product_id,
                "variant_id": variant_id,
                "size": size,
                "requested": requested,
            })),
            AppError::ProductUnavailable { product_id, .. } => {
                Some(serde_json::json!({ "product_id": product_id }))
            }
            AppError::InvalidOrderState { order_id, status } => {
                Some(serde_json::json!({ "order_id": order_id, "status": status }))
            }
            AppError::MaxRetriesExceeded { max } => Some(serde_json::json!({ "max": max })),
            AppError::Payment(_) => Some(serde_json::json!({ "retryable": true })),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
                code: self.code(),
                detail: self.detail(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
