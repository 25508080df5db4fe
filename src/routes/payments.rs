use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::payments::{PaymentIntentResponse, PaymentRetryResponse},
    error::AppResult,
    response::{ApiResponse, Meta},
    services::payment_intent_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/payment-intent", post(create_payment_intent))
        .route("/{id}/payment-retry", post(retry_payment))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/payment-intent",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Live intent for the order", body = ApiResponse<PaymentIntentResponse>),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not awaiting payment"),
        (status = 502, description = "Payment provider unavailable; safe to retry")
    ),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PaymentIntentResponse>>> {
    let data = payment_intent_service::get_or_create_intent(&state, id).await?;
    Ok(Json(ApiResponse::success("OK", data, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/payment-retry",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Fresh intent for another attempt", body = ApiResponse<PaymentRetryResponse>),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Retry limit reached or order not awaiting payment")
    ),
    tag = "Payments"
)]
pub async fn retry_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PaymentRetryResponse>>> {
    let data = payment_intent_service::retry_payment(&state, id).await?;
    Ok(Json(ApiResponse::success(
        "Payment retry started",
        data,
        Some(Meta::empty()),
    )))
}
