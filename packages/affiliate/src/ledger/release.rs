use chrono::NaiveDateTime;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, prelude::Expr};
use serde_json::json;

use super::{
    Actor, Ledger, UnitOfWork,
    balance::{BalanceDelta, Bucket},
};
use crate::entity::{commission, sea_orm_active_enums::CommissionStatus};
use crate::error::{LedgerError, Result};

impl Ledger {
    /// Moves every matured commission from pending to available.
    pub async fn release_held_commissions(&self) -> Result<u64> {
        self.release_held_commissions_at(chrono::Utc::now().naive_utc())
            .await
    }

    /// Releases commissions whose hold ended at or before `now`.
    ///
    /// Each commission is released in its own transaction, guarded by
    /// `released_at IS NULL`, so overlapping runs never release twice. A
    /// commission that cannot be released is logged and skipped. Database
    /// errors abort the batch so the caller can retry it.
    #[tracing::instrument(name = "ledger::release_held_commissions", skip(self))]
    pub async fn release_held_commissions_at(&self, now: NaiveDateTime) -> Result<u64> {
        let due = commission::Entity::find()
            .filter(commission::Column::Status.eq(CommissionStatus::Pending))
            .filter(commission::Column::HoldUntil.lte(now))
            .filter(commission::Column::ReleasedAt.is_null())
            .order_by_asc(commission::Column::HoldUntil)
            .all(&self.db)
            .await?;

        let mut released = 0u64;
        let mut skipped = 0u64;
        for item in &due {
            match self.release_one(item, now).await {
                Ok(true) => released += 1,
                Ok(false) => {
                    tracing::debug!("Commission {} was released concurrently", item.id);
                }
                Err(LedgerError::Database(e)) => return Err(LedgerError::Database(e)),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Skipping release of commission {}: {}", item.id, e);
                }
            }
        }

        if !due.is_empty() {
            tracing::info!(
                "Released {} of {} matured commissions ({} skipped)",
                released,
                due.len(),
                skipped
            );
        }
        if released > 0 {
            self.audit(
                Actor::system()
                    .audit_entry("commission.release", "commission", "batch")
                    .json(json!({ "released": released, "skipped": skipped })),
            )
            .await;
        }

        Ok(released)
    }

    async fn release_one(&self, item: &commission::Model, now: NaiveDateTime) -> Result<bool> {
        let uow = UnitOfWork::begin_at(&self.db, now).await?;

        let claimed = commission::Entity::update_many()
            .col_expr(commission::Column::ReleasedAt, Expr::value(now))
            .filter(commission::Column::Id.eq(item.id.as_str()))
            .filter(commission::Column::ReleasedAt.is_null())
            .exec(uow.txn())
            .await?;
        if claimed.rows_affected == 0 {
            return Ok(false);
        }

        uow.apply(
            &item.affiliate_id,
            &BalanceDelta::transfer(Bucket::Pending, Bucket::Available, item.amount),
        )
        .await?;
        uow.commit().await?;
        Ok(true)
    }
}
