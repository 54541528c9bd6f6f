//! `SeaORM` Entity for accrued commissions

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::CommissionStatus;

/// A single earnings event. Immutable after creation except `released_at`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "affiliate_commissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub affiliate_id: String,
    /// At most one commission per referral event
    #[sea_orm(column_type = "Text", nullable, unique)]
    pub referral_event_id: Option<String>,
    pub amount: i64,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub status: CommissionStatus,
    pub hold_until: DateTime,
    /// Set once when the hold matures and the amount moves to available
    #[sea_orm(nullable)]
    pub released_at: Option<DateTime>,
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
    #[sea_orm(
        belongs_to = "super::referral_event::Entity",
        from = "Column::ReferralEventId",
        to = "super::referral_event::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    ReferralEvent,
}

impl Related<super::affiliate_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AffiliateProfile.def()
    }
}

impl Related<super::referral_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReferralEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
