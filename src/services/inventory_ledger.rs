//! Every stock mutation goes through here. Reservations are a single
//! conditional `UPDATE ... WHERE stock >= qty`; there is no read-then-write.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, sea_query::Expr};
use uuid::Uuid;

use crate::{
    entity::size_variants::{Column as VariantCol, Entity as SizeVariants},
    error::{AppError, AppResult},
};

/// Decrement stock by `qty` if at least `qty` is available. Returns `false`
/// and changes nothing otherwise.
pub async fn reserve<C: ConnectionTrait>(conn: &C, variant_id: Uuid, qty: i32) -> AppResult<bool> {
    ensure_positive(qty)?;
    let result = SizeVariants::update_many()
        .col_expr(VariantCol::Stock, Expr::col(VariantCol::Stock).sub(qty))
        .filter(VariantCol::Id.eq(variant_id))
        .filter(VariantCol::Stock.gte(qty))
        .exec(conn)
        .await?;

    let reserved = result.rows_affected == 1;
    tracing::debug!(%variant_id, qty, reserved, "stock reservation");
    Ok(reserved)
}

/// Unconditionally add `qty` back. Not idempotent: callers must gate it on a
/// one-time order transition. Returns `false` if the variant does not exist.
pub async fn restore<C: ConnectionTrait>(conn: &C, variant_id: Uuid, qty: i32) -> AppResult<bool> {
    ensure_positive(qty)?;
    let result = SizeVariants::update_many()
        .col_expr(VariantCol::Stock, Expr::col(VariantCol::Stock).add(qty))
        .filter(VariantCol::Id.eq(variant_id))
        .exec(conn)
        .await?;

    let restored = result.rows_affected == 1;
    if !restored {
        tracing::warn!(%variant_id, qty, "stock restore hit missing variant");
    }
    Ok(restored)
}

pub async fn stock_of<C: ConnectionTrait>(conn: &C, variant_id: Uuid) -> AppResult<Option<i32>> {
    let variant = SizeVariants::find_by_id(variant_id).one(conn).await?;
    Ok(variant.map(|v| v.stock))
}

fn ensure_positive(qty: i32) -> AppResult<()> {
    if qty <= 0 {
        return Err(AppError::BadRequest(format!(
            "quantity must be greater than 0, got {qty}"
        )));
    }
    Ok(())
}
