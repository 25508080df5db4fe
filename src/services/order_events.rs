//! Append-only order timeline. Rows are never updated or deleted.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    entity::order_events::{
        ActiveModel as EventActive, Column as EventCol, Entity as OrderEvents, Model as EventModel,
    },
    error::AppResult,
    models::OrderEventKind,
};

pub async fn append<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    kind: OrderEventKind,
    message: Option<&str>,
    meta: Option<Value>,
) -> AppResult<EventModel> {
    let event = EventActive {
        id: NotSet,
        order_id: Set(order_id),
        kind: Set(kind.as_str().to_string()),
        message: Set(message.map(str::to_string)),
        meta: Set(meta),
        created_at: Set(Utc::now().into()),
    }
    .insert(conn)
    .await?;

    tracing::debug!(%order_id, kind = kind.as_str(), event_id = event.id, "order event appended");
    Ok(event)
}

/// Events in append order.
pub async fn timeline<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<Vec<EventModel>> {
    let events = OrderEvents::find()
        .filter(EventCol::OrderId.eq(order_id))
        .order_by_asc(EventCol::Id)
        .all(conn)
        .await?;
    Ok(events)
}

pub async fn count_kind<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    kind: OrderEventKind,
) -> AppResult<u64> {
    let count = OrderEvents::find()
        .filter(EventCol::OrderId.eq(order_id))
        .filter(EventCol::Kind.eq(kind.as_str()))
        .count(conn)
        .await?;
    Ok(count)
}
