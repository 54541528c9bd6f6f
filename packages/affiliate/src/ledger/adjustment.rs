use sea_orm::{ActiveModelTrait, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Actor, Ledger, UnitOfWork, balance::BalanceDelta, new_id};
use crate::entity::{balance_adjustment, sea_orm_active_enums::AdjustmentBucket};
use crate::error::{LedgerError, Result};

/// Manual correction as submitted by an admin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdjustBalanceInput {
    /// Signed minor units; negative values debit the bucket.
    pub amount: i64,
    /// `pending`, `available` or `paid`
    pub balance_type: String,
    pub reason: String,
}

impl AdjustBalanceInput {
    pub fn validate(&self) -> Result<AdjustmentBucket> {
        if self.amount == 0 {
            return Err(LedgerError::validation("amount cannot be zero"));
        }
        if self.reason.trim().is_empty() {
            return Err(LedgerError::validation("reason is required"));
        }
        self.balance_type
            .parse::<AdjustmentBucket>()
            .map_err(LedgerError::validation)
    }
}

impl Ledger {
    /// Applies a signed correction to one bucket and to lifetime earnings,
    /// recording the adjustment in the same transaction.
    #[tracing::instrument(name = "ledger::adjust_balance", skip(self, input))]
    pub async fn adjust_balance(
        &self,
        user_id: &str,
        admin: &Actor,
        input: AdjustBalanceInput,
    ) -> Result<balance_adjustment::Model> {
        let bucket = input.validate()?;
        let reason = input.reason.trim().to_string();

        let uow = UnitOfWork::begin(&self.db).await?;
        let profile = uow.lock_profile_by_user(user_id).await?;

        let adjustment = balance_adjustment::ActiveModel {
            id: Set(new_id()),
            user_id: Set(profile.user_id.clone()),
            admin_id: Set(admin.id.clone()),
            amount: Set(input.amount),
            balance_type: Set(bucket),
            reason: Set(reason),
            created_at: Set(uow.now()),
        }
        .insert(uow.txn())
        .await?;

        uow.apply(&profile.id, &BalanceDelta::adjustment(bucket, input.amount))
            .await?;
        uow.commit().await?;

        tracing::info!(
            "Adjusted {:?} balance of {} by {} ({})",
            bucket,
            user_id,
            input.amount,
            admin.id
        );
        self.audit(
            admin
                .audit_entry("balance.adjust", "affiliate_profile", profile.id.clone())
                .json(json!({
                    "balance_type": bucket,
                    "amount": adjustment.amount,
                    "reason": adjustment.reason,
                })),
        )
        .await;

        Ok(adjustment)
    }
}
