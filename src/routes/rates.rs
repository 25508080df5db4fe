use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::checkout::{RateQuoteRequest, RateQuoteResponse},
    error::AppResult,
    response::{ApiResponse, Meta},
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/quote", post(quote))
}

#[utoipa::path(
    post,
    path = "/api/rates/quote",
    request_body = RateQuoteRequest,
    responses(
        (status = 200, description = "Tax and shipping for the cart", body = ApiResponse<RateQuoteResponse>),
        (status = 400, description = "Empty cart, bad quantity, unavailable product or invalid discount")
    ),
    tag = "Rates"
)]
pub async fn quote(
    State(state): State<AppState>,
    Json(payload): Json<RateQuoteRequest>,
) -> AppResult<Json<ApiResponse<RateQuoteResponse>>> {
    let data = order_service::quote_cart(
        &state,
        &payload.lines,
        &payload.destination,
        payload.discount_code.as_deref(),
    )
    .await?;
    Ok(Json(ApiResponse::success("OK", data, Some(Meta::empty()))))
}
