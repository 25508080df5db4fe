use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::payments::WebhookAck,
    error::AppResult,
    services::webhook_service,
    state::AppState,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/payments", post(payment_webhook))
}

/// The body is taken raw: the signature covers the exact bytes sent.
#[utoipa::path(
    post,
    path = "/api/webhooks/payments",
    request_body(content = String, description = "Provider event payload", content_type = "application/json"),
    params(("Stripe-Signature" = Option<String>, Header, description = "Required in live mode")),
    responses(
        (status = 200, description = "Event applied or already applied", body = WebhookAck),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Signature rejected"),
        (status = 404, description = "Event references an unknown order")
    ),
    tag = "Webhooks"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let ack = webhook_service::handle_event(&state, &body, signature).await?;
    Ok(Json(ack))
}
