//! Applies payment provider events to orders. Two guards keep side effects
//! exactly-once: the processed-event row claimed inside the applying
//! transaction, and status transitions that only fire from a pre-payment state.

use std::collections::BTreeSet;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait, sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::{
    dto::payments::WebhookAck,
    entity::{
        order_items::{Column as ItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders, Model as OrderModel},
        payment_records::{Column as PaymentCol, Entity as PaymentRecords},
        processed_webhook_events::{
            ActiveModel as ProcessedActive, Column as ProcessedCol, Entity as ProcessedWebhookEvents,
        },
    },
    error::{AppError, AppResult},
    models::{OrderEventKind, OrderStatus, PaymentStatus},
    payments::{IntentRef, PaymentError, PaymentEvent, WebhookEvent},
    services::{inventory_ledger, order_events, product_metrics},
    state::AppState,
};

/// Verify, decode and apply one webhook delivery.
pub async fn handle_event(
    state: &AppState,
    payload: &[u8],
    signature: Option<&str>,
) -> AppResult<WebhookAck> {
    let event = state
        .payments
        .parse_webhook(payload, signature)
        .map_err(|err| match err {
            PaymentError::Signature(reason) => AppError::InvalidSignature(reason),
            PaymentError::Payload(reason) => AppError::BadRequest(reason),
            other => AppError::Payment(other),
        })?;

    tracing::debug!(
        event_id = event.id.as_deref().unwrap_or("-"),
        event_type = %event.event_type,
        origin = ?event.origin,
        "webhook received"
    );

    if let Some(event_id) = event.id.as_deref()
        && ProcessedWebhookEvents::find_by_id(event_id.to_string())
            .one(&state.orm)
            .await?
            .is_some()
    {
        state.telemetry.webhook_duplicate();
        tracing::info!(event_id, "duplicate webhook delivery");
        return Ok(WebhookAck::idempotent());
    }

    let ack = match &event.payment {
        PaymentEvent::Succeeded(intent) => apply_success(state, &event, intent).await?,
        PaymentEvent::Failed(intent) => apply_failure(state, &event, intent).await?,
        PaymentEvent::Awaiting { intent, authorized } => {
            apply_awaiting(state, &event, intent, *authorized).await?
        }
        PaymentEvent::Ignored => {
            tracing::debug!(event_type = %event.event_type, "ignoring webhook event type");
            WebhookAck::applied()
        }
    };

    if ack.idempotent {
        state.telemetry.webhook_duplicate();
    }
    Ok(ack)
}

async fn apply_success(
    state: &AppState,
    event: &WebhookEvent,
    intent: &IntentRef,
) -> AppResult<WebhookAck> {
    let txn = state.orm.begin().await?;
    if !claim(&txn, state, event).await? {
        return Ok(WebhookAck::idempotent());
    }

    let order = resolve_order(&txn, intent).await?;
    let status = parse_status(&order)?;
    let order_id = order.id;

    if status == OrderStatus::Paid {
        txn.commit().await?;
        tracing::info!(%order_id, "order already paid");
        return Ok(WebhookAck::idempotent());
    }
    if !status.is_pre_payment() {
        order_events::append(
            &txn,
            order_id,
            OrderEventKind::SystemEvent,
            Some("payment success received for non-payable order"),
            Some(serde_json::json!({
                "event_type": event.event_type,
                "event_id": event.id,
                "status": order.status,
                "payment_intent_id": intent.intent_id,
            })),
        )
        .await?;
        txn.commit().await?;
        state.telemetry.webhook_rejected();
        tracing::error!(%order_id, status = %order.status, "payment succeeded for order that cannot be paid");
        return Ok(WebhookAck::applied());
    }

    if let Some(amount) = intent.amount_cents
        && amount != order.total_cents
    {
        tracing::warn!(%order_id, amount, total = order.total_cents, "captured amount differs from order total");
    }

    let now = Utc::now();
    let moved = transition(&txn, order_id, OrderStatus::Paid, |update| {
        update.col_expr(OrderCol::PaidAt, Expr::value(now))
    })
    .await?;
    if !moved {
        txn.rollback().await?;
        tracing::info!(%order_id, "lost race applying payment success");
        return Ok(WebhookAck::idempotent());
    }

    settle_payment_records(&txn, order_id, PaymentStatus::Captured).await?;

    let product_ids: BTreeSet<Uuid> = OrderItems::find()
        .filter(ItemCol::OrderId.eq(order_id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|item| item.product_id)
        .collect();
    for product_id in &product_ids {
        product_metrics::upsert_counter(&txn, *product_id, 1).await?;
    }

    order_events::append(
        &txn,
        order_id,
        OrderEventKind::PaymentSucceeded,
        Some("payment captured"),
        Some(serde_json::json!({
            "event_id": event.id,
            "payment_intent_id": intent.intent_id,
            "amount_cents": intent.amount_cents,
        })),
    )
    .await?;
    txn.commit().await?;

    state.telemetry.webhook_applied();
    tracing::info!(%order_id, products = product_ids.len(), "order paid");
    Ok(WebhookAck::applied())
}

async fn apply_failure(
    state: &AppState,
    event: &WebhookEvent,
    intent: &IntentRef,
) -> AppResult<WebhookAck> {
    let txn = state.orm.begin().await?;
    if !claim(&txn, state, event).await? {
        return Ok(WebhookAck::idempotent());
    }

    let order = resolve_order(&txn, intent).await?;
    let order_id = order.id;
    if !parse_status(&order)?.is_pre_payment() {
        txn.commit().await?;
        tracing::info!(%order_id, status = %order.status, "payment failure for settled order");
        return Ok(WebhookAck::idempotent());
    }

    let now = Utc::now();
    let moved = transition(&txn, order_id, OrderStatus::Cancelled, |update| {
        update.col_expr(OrderCol::CancelledAt, Expr::value(now))
    })
    .await?;
    if !moved {
        txn.rollback().await?;
        tracing::info!(%order_id, "lost race applying payment failure");
        return Ok(WebhookAck::idempotent());
    }

    settle_payment_records(&txn, order_id, PaymentStatus::Failed).await?;

    // Same transaction as the status write, so stock comes back exactly once.
    let items = OrderItems::find()
        .filter(ItemCol::OrderId.eq(order_id))
        .all(&txn)
        .await?;
    let mut restored = Vec::new();
    let mut units = 0u64;
    for item in &items {
        let Some(variant_id) = item.variant_id else {
            continue;
        };
        if inventory_ledger::restore(&txn, variant_id, item.quantity).await? {
            units += item.quantity as u64;
            restored.push(serde_json::json!({
                "variant_id": variant_id,
                "size": item.size,
                "quantity": item.quantity,
            }));
        }
    }
    if !restored.is_empty() {
        order_events::append(
            &txn,
            order_id,
            OrderEventKind::StockRestored,
            Some("reserved stock returned"),
            Some(serde_json::json!({ "lines": restored })),
        )
        .await?;
    }

    order_events::append(
        &txn,
        order_id,
        OrderEventKind::PaymentFailed,
        intent.failure_message.as_deref().or(Some("payment failed")),
        Some(serde_json::json!({
            "event_id": event.id,
            "event_type": event.event_type,
            "payment_intent_id": intent.intent_id,
        })),
    )
    .await?;
    txn.commit().await?;

    state.telemetry.webhook_applied();
    state.telemetry.stock_restored(units);
    tracing::info!(%order_id, units, "order cancelled after payment failure");
    Ok(WebhookAck::applied())
}

async fn apply_awaiting(
    state: &AppState,
    event: &WebhookEvent,
    intent: &IntentRef,
    authorized: bool,
) -> AppResult<WebhookAck> {
    let txn = state.orm.begin().await?;
    if !claim(&txn, state, event).await? {
        return Ok(WebhookAck::idempotent());
    }

    let order = resolve_order(&txn, intent).await?;
    let order_id = order.id;
    if !parse_status(&order)?.is_pre_payment() {
        txn.commit().await?;
        return Ok(WebhookAck::idempotent());
    }

    let moved = Orders::update_many()
        .col_expr(
            OrderCol::Status,
            Expr::value(OrderStatus::AwaitingPayment.as_str()),
        )
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
        .exec(&txn)
        .await?
        .rows_affected
        == 1;

    if authorized {
        PaymentRecords::update_many()
            .col_expr(PaymentCol::Status, Expr::value(PaymentStatus::Authorized.as_str()))
            .col_expr(PaymentCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(PaymentCol::OrderId.eq(order_id))
            .filter(PaymentCol::Status.eq(PaymentStatus::PaymentPending.as_str()))
            .exec(&txn)
            .await?;
    }

    order_events::append(
        &txn,
        order_id,
        OrderEventKind::PaymentAwaiting,
        Some(if authorized {
            "payment authorized"
        } else {
            "payment processing"
        }),
        Some(serde_json::json!({
            "event_id": event.id,
            "payment_intent_id": intent.intent_id,
            "status_changed": moved,
        })),
    )
    .await?;
    txn.commit().await?;

    state.telemetry.webhook_applied();
    Ok(WebhookAck::applied())
}

/// Insert the processed-event row. `false` means another delivery of the same
/// event already holds it. Events without an id are not gated here; the status
/// guard still applies.
async fn claim(txn: &DatabaseTransaction, state: &AppState, event: &WebhookEvent) -> AppResult<bool> {
    let Some(event_id) = event.id.clone() else {
        return Ok(true);
    };

    let row = ProcessedActive {
        event_id: Set(event_id.clone()),
        provider: Set(state.payments.kind().as_str().to_string()),
        event_type: Set(event.event_type.clone()),
        created_at: Set(Utc::now().into()),
    };
    let inserted = ProcessedWebhookEvents::insert(row)
        .on_conflict(
            OnConflict::column(ProcessedCol::EventId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;

    if inserted == 0 {
        tracing::info!(event_id, "webhook claimed by concurrent delivery");
    }
    Ok(inserted == 1)
}

/// Metadata order id first, then the payment record holding the intent.
async fn resolve_order<C: ConnectionTrait>(conn: &C, intent: &IntentRef) -> AppResult<OrderModel> {
    let order_id = match intent.order_id {
        Some(id) => Some(id),
        None => match intent.intent_id.as_deref() {
            Some(intent_id) => PaymentRecords::find()
                .filter(PaymentCol::ProviderRef.eq(intent_id))
                .one(conn)
                .await?
                .map(|record| record.order_id),
            None => None,
        },
    };

    let Some(order_id) = order_id else {
        tracing::warn!(intent_id = ?intent.intent_id, "webhook does not reference an order");
        return Err(AppError::NotFound);
    };

    Orders::find_by_id(order_id).one(conn).await?.ok_or_else(|| {
        tracing::warn!(%order_id, "webhook references unknown order");
        AppError::NotFound
    })
}

fn parse_status(order: &OrderModel) -> AppResult<OrderStatus> {
    order
        .status
        .parse()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("order {}: {e}", order.id)))
}

/// Conditional status write from a pre-payment state. `false` when another
/// writer got there first.
async fn transition<F>(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    to: OrderStatus,
    extra: F,
) -> AppResult<bool>
where
    F: FnOnce(sea_orm::UpdateMany<Orders>) -> sea_orm::UpdateMany<Orders>,
{
    let update = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(to.as_str()))
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::Status.is_in(OrderStatus::pre_payment_strs()));
    let result = extra(update).exec(txn).await?;
    Ok(result.rows_affected == 1)
}

async fn settle_payment_records(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    to: PaymentStatus,
) -> AppResult<u64> {
    let result = PaymentRecords::update_many()
        .col_expr(PaymentCol::Status, Expr::value(to.as_str()))
        .col_expr(PaymentCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(PaymentCol::OrderId.eq(order_id))
        .filter(PaymentCol::Status.is_in(PaymentStatus::live_strs()))
        .exec(txn)
        .await?;
    Ok(result.rows_affected)
}
