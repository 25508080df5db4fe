use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "discount_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    /// `percent` or `fixed`
    pub kind: String,
    pub percent: Option<i32>,
    pub amount_cents: Option<i64>,
    pub active: bool,
    pub expires_at: Option<DateTimeWithTimeZone>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
