use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderTimeline, OrderWithItems},
    error::AppResult,
    response::{ApiResponse, Meta},
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_order))
        .route("/{id}/events", get(order_events))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items and payment records", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Order not found")
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let data = order_service::get_order(&state, id).await?;
    Ok(Json(ApiResponse::success("OK", data, Some(Meta::empty()))))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}/events",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order timeline, oldest first", body = ApiResponse<OrderTimeline>),
        (status = 404, description = "Order not found")
    ),
    tag = "Orders"
)]
pub async fn order_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderTimeline>>> {
    let items = order_service::get_timeline(&state, id).await?;
    let total = items.len() as i64;
    let data = OrderTimeline { items };
    Ok(Json(ApiResponse::success(
        "OK",
        data,
        Some(Meta::new(1, total, total)),
    )))
}
