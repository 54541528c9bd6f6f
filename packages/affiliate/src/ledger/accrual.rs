use chrono::Duration;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::json;

use super::{Actor, Ledger, UnitOfWork, balance::BalanceDelta, new_id};
use crate::entity::{
    affiliate_profile, commission, referral_event,
    sea_orm_active_enums::{AffiliateStatus, CommissionStatus},
};
use crate::error::{LedgerError, Result};
use crate::settings::AffiliateSettings;

impl Ledger {
    /// Records a commission and credits it to pending balance and lifetime
    /// earnings in the same transaction.
    #[tracing::instrument(name = "ledger::grant_commission", skip(self, description))]
    pub async fn grant_commission(
        &self,
        affiliate_id: &str,
        referral_event_id: Option<&str>,
        amount: i64,
        description: &str,
        hold_days: i64,
    ) -> Result<commission::Model> {
        if amount <= 0 {
            return Err(LedgerError::validation(
                "commission amount must be greater than zero",
            ));
        }
        if hold_days < 0 {
            return Err(LedgerError::validation("hold days cannot be negative"));
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let profile = uow.lock_profile(affiliate_id).await?;
        let now = uow.now();
        let hold_until = Duration::try_days(hold_days)
            .and_then(|hold| now.checked_add_signed(hold))
            .ok_or_else(|| LedgerError::validation("hold days out of range"))?;

        let commission = commission::ActiveModel {
            id: Set(new_id()),
            affiliate_id: Set(profile.id.clone()),
            referral_event_id: Set(referral_event_id.map(str::to_string)),
            amount: Set(amount),
            description: Set(description.to_string()),
            status: Set(CommissionStatus::Pending),
            hold_until: Set(hold_until),
            released_at: Set(None),
            created_at: Set(now),
        }
        .insert(uow.txn())
        .await
        .map_err(|e| LedgerError::from_insert(e, "referral event already has a commission"))?;

        uow.apply(&profile.id, &BalanceDelta::accrual(amount)).await?;
        uow.commit().await?;

        tracing::info!(
            "Granted commission {} of {} to affiliate {}",
            commission.id,
            amount,
            profile.id
        );
        self.audit(
            Actor::system()
                .audit_entry("commission.grant", "commission", commission.id.clone())
                .json(json!({
                    "affiliate_id": profile.id,
                    "amount": amount,
                    "hold_until": commission.hold_until,
                })),
        )
        .await;

        Ok(commission)
    }

    /// Grants the referral commission for a verified sign-up.
    ///
    /// Returns `None` when the program is disabled or the referrer is not an
    /// approved, unblocked affiliate.
    #[tracing::instrument(name = "ledger::accrue_for_referral", skip(self, settings))]
    pub async fn accrue_for_referral(
        &self,
        settings: &AffiliateSettings,
        referred_user_id: &str,
    ) -> Result<Option<commission::Model>> {
        if !settings.enabled {
            tracing::info!("Affiliate program disabled, skipping accrual");
            return Ok(None);
        }

        let event = referral_event::Entity::find()
            .filter(referral_event::Column::ReferredId.eq(referred_user_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| LedgerError::not_found("referral event", referred_user_id))?;

        if !event.verified {
            return Err(LedgerError::invalid_state(format!(
                "referral of {referred_user_id} is not verified"
            )));
        }

        let Some(profile) = affiliate_profile::Entity::find()
            .filter(affiliate_profile::Column::UserId.eq(event.referrer_id.as_str()))
            .one(&self.db)
            .await?
        else {
            tracing::info!("Referrer {} is not an affiliate", event.referrer_id);
            return Ok(None);
        };

        if profile.status != AffiliateStatus::Approved || profile.is_blocked {
            tracing::info!(
                "Referrer {} is not eligible for commission ({:?}, blocked={})",
                event.referrer_id,
                profile.status,
                profile.is_blocked
            );
            return Ok(None);
        }

        let existing = commission::Entity::find()
            .filter(commission::Column::ReferralEventId.eq(event.id.as_str()))
            .count(&self.db)
            .await?;
        if existing > 0 {
            return Err(LedgerError::conflict(format!(
                "referral event {} already has a commission",
                event.id
            )));
        }

        let amount = settings.commission_for(None)?;
        if amount <= 0 {
            tracing::info!("Configured referral commission is zero, skipping accrual");
            return Ok(None);
        }

        let commission = self
            .grant_commission(
                &profile.id,
                Some(&event.id),
                amount,
                &format!("Verified referral {referred_user_id}"),
                settings.hold_days(),
            )
            .await?;
        Ok(Some(commission))
    }
}
