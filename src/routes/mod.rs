use axum::Router;

use crate::state::AppState;

pub mod checkout;
pub mod doc;
pub mod health;
pub mod orders;
pub mod payments;
pub mod rates;
pub mod webhooks;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/checkout", checkout::router())
        .nest("/orders", orders::router().merge(payments::router()))
        .nest("/rates", rates::router())
        .nest("/webhooks", webhooks::router())
}
