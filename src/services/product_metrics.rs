use chrono::Utc;
use sea_orm::{ConnectionTrait, EntityTrait, Set, sea_query::{Expr, OnConflict}};
use uuid::Uuid;

use crate::{
    entity::product_metrics::{
        ActiveModel as MetricsActive, Column as MetricsCol, Entity as ProductMetrics,
    },
    error::AppResult,
};

/// Add `delta` to the product's purchase counter, creating the row on first use.
pub async fn upsert_counter<C: ConnectionTrait>(conn: &C, product_id: Uuid, delta: i64) -> AppResult<()> {
    let now = Utc::now();
    let row = MetricsActive {
        product_id: Set(product_id),
        purchase_count: Set(delta),
        updated_at: Set(now.into()),
    };

    ProductMetrics::insert(row)
        .on_conflict(
            OnConflict::column(MetricsCol::ProductId)
                .value(
                    MetricsCol::PurchaseCount,
                    Expr::col((ProductMetrics, MetricsCol::PurchaseCount)).add(delta),
                )
                .update_column(MetricsCol::UpdatedAt)
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

pub async fn purchase_count<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> AppResult<i64> {
    let row = ProductMetrics::find_by_id(product_id).one(conn).await?;
    Ok(row.map(|r| r.purchase_count).unwrap_or(0))
}
