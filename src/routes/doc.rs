use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        checkout::{CartLine, CheckoutRequest, CheckoutResponse, RateQuoteRequest, RateQuoteResponse},
        orders::{OrderTimeline, OrderWithItems},
        payments::{PaymentIntentResponse, PaymentRetryResponse, WebhookAck},
    },
    models::{Address, Order, OrderEvent, OrderEventKind, OrderItem, OrderStatus, PaymentRecord, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::{checkout, health, orders, payments, rates, webhooks},
    services::rate_calculator::{Destination, RateBreakdown, RateQuote},
    telemetry::TelemetrySnapshot,
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        checkout::checkout,
        orders::get_order,
        orders::order_events,
        payments::create_payment_intent,
        payments::retry_payment,
        webhooks::payment_webhook,
        rates::quote
    ),
    components(
        schemas(
            Address,
            Order,
            OrderItem,
            OrderEvent,
            OrderEventKind,
            OrderStatus,
            PaymentRecord,
            PaymentStatus,
            CartLine,
            CheckoutRequest,
            CheckoutResponse,
            RateQuoteRequest,
            RateQuoteResponse,
            RateQuote,
            RateBreakdown,
            Destination,
            OrderWithItems,
            OrderTimeline,
            PaymentIntentResponse,
            PaymentRetryResponse,
            WebhookAck,
            health::HealthData,
            TelemetrySnapshot,
            Meta,
            ApiResponse<CheckoutResponse>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderTimeline>,
            ApiResponse<PaymentIntentResponse>,
            ApiResponse<PaymentRetryResponse>,
            ApiResponse<RateQuoteResponse>
        )
    ),
    security(
        (),
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Checkout", description = "Cart to order conversion"),
        (name = "Orders", description = "Order and timeline endpoints"),
        (name = "Payments", description = "Payment intent endpoints"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Rates", description = "Tax and shipping quotes"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
