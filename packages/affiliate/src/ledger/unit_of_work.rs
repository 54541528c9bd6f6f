//! One database transaction per ledger mutation.
//!
//! Dropping a [`UnitOfWork`] without calling [`UnitOfWork::commit`] rolls the
//! transaction back, so every early return through `?` leaves balances as they
//! were.

use chrono::NaiveDateTime;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
    TransactionTrait, prelude::Expr,
};

use super::balance::{BalanceDelta, Balances};
use crate::entity::{affiliate_profile, payout_request};
use crate::error::{LedgerError, Result};

pub struct UnitOfWork {
    txn: DatabaseTransaction,
    now: NaiveDateTime,
}

impl UnitOfWork {
    pub async fn begin(db: &DatabaseConnection) -> Result<Self> {
        Self::begin_at(db, chrono::Utc::now().naive_utc()).await
    }

    /// Starts a transaction whose timestamps all read `now`.
    pub async fn begin_at(db: &DatabaseConnection, now: NaiveDateTime) -> Result<Self> {
        let txn = db.begin().await?;
        Ok(Self { txn, now })
    }

    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub async fn commit(self) -> Result<()> {
        self.txn.commit().await?;
        Ok(())
    }

    /// Reads a profile by id with `FOR UPDATE`.
    pub async fn lock_profile(&self, profile_id: &str) -> Result<affiliate_profile::Model> {
        affiliate_profile::Entity::find_by_id(profile_id.to_string())
            .lock_exclusive()
            .one(&self.txn)
            .await?
            .ok_or_else(|| LedgerError::not_found("affiliate profile", profile_id))
    }

    /// Reads the profile owned by `user_id` with `FOR UPDATE`.
    pub async fn lock_profile_by_user(&self, user_id: &str) -> Result<affiliate_profile::Model> {
        affiliate_profile::Entity::find()
            .filter(affiliate_profile::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(&self.txn)
            .await?
            .ok_or_else(|| LedgerError::not_found("affiliate profile", user_id))
    }

    pub async fn lock_payout(&self, payout_id: &str) -> Result<payout_request::Model> {
        payout_request::Entity::find_by_id(payout_id.to_string())
            .lock_exclusive()
            .one(&self.txn)
            .await?
            .ok_or_else(|| LedgerError::not_found("payout request", payout_id))
    }

    /// Applies `delta` to the profile's money columns in a single conditional
    /// update.
    ///
    /// Each debited column carries `column >= -amount` in the WHERE clause, so
    /// the row is only touched when no column would go negative. On zero rows
    /// the current row is re-read to report which bucket was short.
    pub async fn apply(&self, profile_id: &str, delta: &BalanceDelta) -> Result<()> {
        if delta.is_zero() {
            return Ok(());
        }

        let mut update = affiliate_profile::Entity::update_many()
            .col_expr(affiliate_profile::Column::UpdatedAt, Expr::value(self.now))
            .filter(affiliate_profile::Column::Id.eq(profile_id));

        for (bucket, amount) in delta.entries() {
            let column = bucket.column();
            update = update.col_expr(column, Expr::col(column).add(amount));
            if amount < 0 {
                update = update.filter(column.gte(-amount));
            }
        }

        let result = update.exec(&self.txn).await?;
        if result.rows_affected == 1 {
            return Ok(());
        }

        let profile = affiliate_profile::Entity::find_by_id(profile_id.to_string())
            .one(&self.txn)
            .await?
            .ok_or_else(|| LedgerError::not_found("affiliate profile", profile_id))?;

        let err = Balances::from(&profile)
            .shortfall(delta)
            .unwrap_or_else(|| {
                LedgerError::invalid_state(format!(
                    "balance update on profile {profile_id} matched no row"
                ))
            });
        tracing::warn!("Rejected balance update on {}: {}", profile_id, err);
        Err(err)
    }
}
