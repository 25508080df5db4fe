use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, sea_query::Expr,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    entity::discount_codes::{Column as DiscountCol, Entity as DiscountCodes, Model as DiscountModel},
    error::{AppError, AppResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percent(i32),
    Fixed(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedDiscount {
    pub discount_id: Uuid,
    pub code: String,
    pub kind: DiscountKind,
    pub amount_cents: i64,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Check a code against its current row and price it for `subtotal_cents`.
/// Does not consume a use; see [`redeem`].
pub async fn validate<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    subtotal_cents: i64,
    now: DateTime<Utc>,
) -> AppResult<AppliedDiscount> {
    let code = normalize_code(code);
    let row = DiscountCodes::find()
        .filter(DiscountCol::Code.eq(code.clone()))
        .one(conn)
        .await?
        .ok_or_else(|| AppError::InvalidDiscount(format!("{code} does not exist")))?;

    if !row.active {
        return Err(AppError::InvalidDiscount(format!("{code} is not active")));
    }
    if row.expires_at.is_some_and(|at| at.with_timezone(&Utc) <= now) {
        return Err(AppError::InvalidDiscount(format!("{code} has expired")));
    }
    if row.max_uses.is_some_and(|max| row.used_count >= max) {
        return Err(AppError::InvalidDiscount(format!("{code} is exhausted")));
    }

    let kind = kind_of(&row)?;
    Ok(AppliedDiscount {
        discount_id: row.id,
        amount_cents: amount_for(kind, subtotal_cents),
        code,
        kind,
    })
}

/// Consume one use. The increment is conditional on remaining uses, so two
/// concurrent checkouts cannot both take the last one.
pub async fn redeem<C: ConnectionTrait>(conn: &C, discount: &AppliedDiscount) -> AppResult<()> {
    let result = DiscountCodes::update_many()
        .col_expr(DiscountCol::UsedCount, Expr::col(DiscountCol::UsedCount).add(1))
        .filter(DiscountCol::Id.eq(discount.discount_id))
        .filter(
            Condition::any()
                .add(DiscountCol::MaxUses.is_null())
                .add(Expr::col(DiscountCol::UsedCount).lt(Expr::col(DiscountCol::MaxUses))),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::InvalidDiscount(format!(
            "{} is exhausted",
            discount.code
        )));
    }
    Ok(())
}

fn kind_of(row: &DiscountModel) -> AppResult<DiscountKind> {
    match (row.kind.as_str(), row.percent, row.amount_cents) {
        ("percent", Some(p), _) if (0..=100).contains(&p) => Ok(DiscountKind::Percent(p)),
        ("fixed", _, Some(a)) if a >= 0 => Ok(DiscountKind::Fixed(a)),
        _ => Err(AppError::InvalidDiscount(format!(
            "{} is misconfigured",
            row.code
        ))),
    }
}

/// Never more than the subtotal, so order totals stay non-negative.
pub fn amount_for(kind: DiscountKind, subtotal_cents: i64) -> i64 {
    let raw = match kind {
        DiscountKind::Percent(p) => subtotal_cents * i64::from(p) / 100,
        DiscountKind::Fixed(a) => a,
    };
    raw.clamp(0, subtotal_cents.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_discount_is_floored_share_of_subtotal() {
        assert_eq!(amount_for(DiscountKind::Percent(10), 5000), 500);
        assert_eq!(amount_for(DiscountKind::Percent(15), 999), 149);
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        assert_eq!(amount_for(DiscountKind::Fixed(2500), 1000), 1000);
        assert_eq!(amount_for(DiscountKind::Fixed(300), 1000), 300);
    }

    #[test]
    fn codes_are_case_insensitive() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
    }
}
