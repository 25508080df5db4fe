use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};

use crate::{
    dto::checkout::{CheckoutRequest, CheckoutResponse},
    error::AppResult,
    middleware::auth::CartIdentity,
    response::{ApiResponse, Meta},
    services::order_service::{self, CartSnapshot, CreateOrder},
    state::AppState,
};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}

#[utoipa::path(
    post,
    path = "/api/checkout",
    request_body = CheckoutRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Replays return the original order"),
        ("x-session-id" = Option<String>, Header, description = "Guest cart session when not signed in")
    ),
    responses(
        (status = 201, description = "Order created", body = ApiResponse<CheckoutResponse>),
        (status = 200, description = "Order replayed from idempotency key", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Empty cart, unavailable product or invalid discount"),
        (status = 409, description = "Insufficient stock")
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    CartIdentity(owner): CartIdentity,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CheckoutResponse>>)> {
    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(payload.idempotency_key);

    let created = order_service::create_order(
        &state,
        CreateOrder {
            cart: CartSnapshot {
                owner,
                lines: payload.lines,
            },
            email: payload.email,
            shipping_address: payload.shipping_address,
            discount_code: payload.discount_code,
            idempotency_key,
        },
    )
    .await?;

    let status = if created.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let data = CheckoutResponse {
        order_id: created.order.id,
        replayed: created.replayed,
    };
    Ok((
        status,
        Json(ApiResponse::success("Order created", data, Some(Meta::empty()))),
    ))
}
