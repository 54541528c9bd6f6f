//! `SeaORM` Entity for affiliate enrollments and their balance buckets

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{AffiliateStatus, PayoutMethod};

/// A user's enrollment in the affiliate program.
///
/// All money columns are minor currency units.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "affiliate_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text", unique)]
    pub user_id: String,
    pub status: AffiliateStatus,
    pub payout_method: PayoutMethod,
    #[sea_orm(column_type = "Text")]
    pub provider_name: String,
    /// AES-GCM ciphertext, never decrypted inside the ledger
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub payout_name_encrypted: String,
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub payout_number_encrypted: String,
    /// Lifetime earnings; moves only together with a bucket
    pub total_earnings: i64,
    pub total_paid: i64,
    /// Accrued commissions still inside their hold period
    pub pending_balance: i64,
    /// Withdrawable
    pub available_balance: i64,
    /// Reserved by an approved payout request
    pub locked_balance: i64,
    pub is_blocked: bool,
    pub is_suspicious: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub blocked_reason: Option<String>,
    #[sea_orm(nullable)]
    pub blocked_at: Option<DateTime>,
    #[sea_orm(nullable)]
    pub approved_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::commission::Entity")]
    Commission,
    #[sea_orm(has_many = "super::payout_request::Entity")]
    PayoutRequest,
}

impl Related<super::commission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commission.def()
    }
}

impl Related<super::payout_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PayoutRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
