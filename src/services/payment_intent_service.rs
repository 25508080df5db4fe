use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    dto::payments::{PaymentIntentResponse, PaymentRetryResponse},
    entity::{
        orders::{Column as OrderCol, Entity as Orders, Model as OrderModel},
        payment_records::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as PaymentRecords,
            Model as PaymentModel,
        },
    },
    error::{AppError, AppResult},
    models::{OrderEventKind, OrderStatus, PaymentStatus},
    payments::{CreateIntent, Intent, IntentLookup},
    services::order_events,
    state::AppState,
};

const BACKOFF_BASE_SECS: u64 = 2;
const BACKOFF_CAP_SECS: u64 = 300;

/// Hand out the order's live intent, creating one if needed. Never moves the
/// order out of its pre-payment state; only a webhook does that.
pub async fn get_or_create_intent(
    state: &AppState,
    order_id: Uuid,
) -> AppResult<PaymentIntentResponse> {
    let order = load_pre_payment_order(state, order_id).await?;

    let Some(record) = live_record(&state.orm, order.id).await? else {
        let intent = create_intent(state, &order, None).await?;
        insert_record(state, &order, &intent, None).await?;
        state.telemetry.intent_created();
        return Ok(PaymentIntentResponse {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            reused: false,
        });
    };

    match state.payments.retrieve_intent(&record.provider_ref).await? {
        IntentLookup::Found(intent) if intent.amount_cents == order.total_cents => {
            state.telemetry.intent_reused();
            tracing::debug!(%order_id, intent_id = %intent.id, "reusing live payment intent");
            Ok(PaymentIntentResponse {
                client_secret: intent.client_secret,
                payment_intent_id: intent.id,
                reused: true,
            })
        }
        lookup => {
            let reason = match lookup {
                IntentLookup::Found(intent) => {
                    format!("amount drift: intent {} order {}", intent.amount_cents, order.total_cents)
                }
                IntentLookup::NotFound => "intent not found at provider".to_string(),
                IntentLookup::Stale { reason } => reason,
            };
            tracing::info!(%order_id, stale_ref = %record.provider_ref, %reason, "replacing payment intent");

            let key = format!("replace-{}", record.provider_ref);
            let intent = create_intent(state, &order, Some(&key)).await?;
            replace_in_place(state, record, &intent, &reason).await?;
            state.telemetry.intent_created();
            Ok(PaymentIntentResponse {
                client_secret: intent.client_secret,
                payment_intent_id: intent.id,
                reused: false,
            })
        }
    }
}

/// Start a fresh payment attempt. Attempts are counted by an atomic
/// conditional increment on the order, so concurrent retries cannot both slip
/// under the limit.
pub async fn retry_payment(state: &AppState, order_id: Uuid) -> AppResult<PaymentRetryResponse> {
    let max = state.settings.max_payment_retries;
    let order = load_pre_payment_order(state, order_id).await?;

    let txn = state.orm.begin().await?;
    let gate = Orders::update_many()
        .col_expr(
            OrderCol::PaymentAttempts,
            Expr::col(OrderCol::PaymentAttempts).add(1),
        )
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::Id.eq(order.id))
        .filter(OrderCol::PaymentAttempts.lt(max))
        .filter(OrderCol::Status.is_in(OrderStatus::pre_payment_strs()))
        .exec(&txn)
        .await?;

    if gate.rows_affected == 0 {
        txn.rollback().await?;
        let current = Orders::find_by_id(order.id)
            .one(&state.orm)
            .await?
            .ok_or(AppError::NotFound)?;
        return Err(rejection_for(&current, max));
    }

    // Read back under the row lock the increment just took.
    let attempt = Orders::find_by_id(order.id)
        .one(&txn)
        .await?
        .map(|o| o.payment_attempts)
        .ok_or(AppError::NotFound)?;
    let retry_after_seconds = backoff_secs(attempt);
    order_events::append(
        &txn,
        order.id,
        OrderEventKind::PaymentRetryAttempt,
        Some("payment retry requested"),
        Some(serde_json::json!({
            "attempt": attempt,
            "max_attempts": max,
            "retry_after_seconds": retry_after_seconds,
        })),
    )
    .await?;
    txn.commit().await?;

    let key = format!("retry-{attempt}");
    let intent = create_intent(state, &order, Some(&key)).await?;
    insert_record(state, &order, &intent, Some(attempt)).await?;
    state.telemetry.payment_retried();

    tracing::info!(%order_id, attempt, max, intent_id = %intent.id, "payment retry started");
    Ok(PaymentRetryResponse {
        client_secret: intent.client_secret,
        payment_intent_id: intent.id,
        attempt,
        max_attempts: max,
        retry_after_seconds,
    })
}

/// Advisory exponential backoff for the client.
pub fn backoff_secs(attempt: i32) -> u64 {
    let exp = attempt.saturating_sub(1).clamp(0, 16) as u32;
    BACKOFF_BASE_SECS
        .saturating_mul(2u64.saturating_pow(exp))
        .min(BACKOFF_CAP_SECS)
}

fn rejection_for(order: &OrderModel, max: i32) -> AppError {
    let pre_payment = order
        .status
        .parse::<OrderStatus>()
        .map(|s| s.is_pre_payment())
        .unwrap_or(false);
    if pre_payment {
        AppError::MaxRetriesExceeded { max }
    } else {
        AppError::InvalidOrderState {
            order_id: order.id,
            status: order.status.clone(),
        }
    }
}

async fn load_pre_payment_order(state: &AppState, order_id: Uuid) -> AppResult<OrderModel> {
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let status: OrderStatus = order
        .status
        .parse()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("order {order_id}: {e}")))?;
    if !status.is_pre_payment() {
        return Err(AppError::InvalidOrderState {
            order_id,
            status: order.status,
        });
    }
    Ok(order)
}

async fn live_record<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<Option<PaymentModel>> {
    let record = PaymentRecords::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .filter(PaymentCol::Status.is_in(PaymentStatus::live_strs()))
        .order_by_desc(PaymentCol::CreatedAt)
        .one(conn)
        .await?;
    Ok(record)
}

async fn create_intent(
    state: &AppState,
    order: &OrderModel,
    key_suffix: Option<&str>,
) -> AppResult<Intent> {
    let idempotency_key = Some(match key_suffix {
        Some(suffix) => format!("order-{}-{suffix}", order.id),
        None => format!("order-{}", order.id),
    });
    let intent = state
        .payments
        .create_intent(CreateIntent {
            order_id: order.id,
            amount_cents: order.total_cents,
            currency: order.currency.clone(),
            idempotency_key,
        })
        .await
        .inspect_err(|err| tracing::warn!(order_id = %order.id, error = %err, "intent creation failed"))?;
    Ok(intent)
}

/// New record for a new attempt. Earlier live records are failed first so only
/// one is ever live.
async fn insert_record(
    state: &AppState,
    order: &OrderModel,
    intent: &Intent,
    attempt: Option<i32>,
) -> AppResult<PaymentModel> {
    let now = Utc::now();
    let txn = state.orm.begin().await?;

    PaymentRecords::update_many()
        .col_expr(PaymentCol::Status, Expr::value(PaymentStatus::Failed.as_str()))
        .col_expr(PaymentCol::UpdatedAt, Expr::value(now))
        .filter(PaymentCol::OrderId.eq(order.id))
        .filter(PaymentCol::Status.is_in(PaymentStatus::live_strs()))
        .exec(&txn)
        .await?;

    let record = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        provider: Set(state.payments.kind().as_str().to_string()),
        provider_ref: Set(intent.id.clone()),
        amount_cents: Set(intent.amount_cents),
        currency: Set(intent.currency.clone()),
        status: Set(PaymentStatus::PaymentPending.as_str().to_string()),
        raw_payload: Set(Some(intent.raw.clone())),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    order_events::append(
        &txn,
        order.id,
        OrderEventKind::PaymentIntentCreated,
        Some("payment intent created"),
        Some(serde_json::json!({
            "payment_intent_id": intent.id,
            "payment_record_id": record.id,
            "amount_cents": intent.amount_cents,
            "attempt": attempt,
        })),
    )
    .await?;

    txn.commit().await?;
    Ok(record)
}

/// Point the existing record at a fresh intent instead of adding a row.
async fn replace_in_place(
    state: &AppState,
    record: PaymentModel,
    intent: &Intent,
    reason: &str,
) -> AppResult<PaymentModel> {
    let order_id = record.order_id;
    let stale_ref = record.provider_ref.clone();
    let txn = state.orm.begin().await?;

    let mut active: PaymentActive = record.into();
    active.provider = Set(state.payments.kind().as_str().to_string());
    active.provider_ref = Set(intent.id.clone());
    active.amount_cents = Set(intent.amount_cents);
    active.currency = Set(intent.currency.clone());
    active.status = Set(PaymentStatus::PaymentPending.as_str().to_string());
    active.raw_payload = Set(Some(intent.raw.clone()));
    active.updated_at = Set(Utc::now().into());
    let record = active.update(&txn).await?;

    order_events::append(
        &txn,
        order_id,
        OrderEventKind::SystemEvent,
        Some("payment intent replaced"),
        Some(serde_json::json!({
            "stale_ref": stale_ref,
            "payment_intent_id": intent.id,
            "reason": reason,
        })),
    )
    .await?;

    txn.commit().await?;
    Ok(record)
}
