//! `SeaORM` Entity for the program-wide settings row (always `id = 1`)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{CommissionType, PayoutSchedule};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "affiliate_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub enabled: bool,
    pub commission_type: CommissionType,
    /// Minor units for fixed types, basis points for `PERCENTAGE`
    pub commission_value: i64,
    pub cookie_days: i32,
    pub referral_hold_days: i32,
    pub payout_minimum: i64,
    pub payout_schedule: PayoutSchedule,
    #[sea_orm(column_type = "Text")]
    pub how_it_works_md: String,
    #[sea_orm(column_type = "Text")]
    pub terms_md: String,
    #[sea_orm(column_type = "Text")]
    pub payout_rules_md: String,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
