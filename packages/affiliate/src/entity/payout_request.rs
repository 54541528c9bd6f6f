//! `SeaORM` Entity for affiliate withdrawal requests

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::PayoutStatus;

/// Withdrawal request filed by the affiliate, driven by admin actions afterwards.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payout_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub user_id: String,
    #[sea_orm(column_type = "Text")]
    pub affiliate_id: String,
    pub amount: i64,
    pub status: PayoutStatus,
    /// Note left by the affiliate when filing
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub admin_note: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub payment_reference: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub proof_url: Option<String>,
    pub requested_at: DateTime,
    #[sea_orm(nullable)]
    pub processed_at: Option<DateTime>,
    #[sea_orm(column_type = "Text", nullable)]
    pub processed_by: Option<String>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::affiliate_profile::Entity",
        from = "Column::AffiliateId",
        to = "super::affiliate_profile::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    AffiliateProfile,
}

impl Related<super::affiliate_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AffiliateProfile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
