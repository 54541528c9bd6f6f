//! Enrollment and admin moderation of affiliate profiles.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Actor, Ledger, UnitOfWork, new_id};
use crate::collaborators::{EncryptionService, mask_string};
use crate::entity::{
    affiliate_profile,
    sea_orm_active_enums::{AffiliateStatus, PayoutMethod},
};
use crate::error::{LedgerError, Result};
use crate::settings::AffiliateSettings;

const MAX_PROVIDER_LEN: usize = 100;
const MAX_ACCOUNT_NAME_LEN: usize = 100;
const MAX_ACCOUNT_NUMBER_LEN: usize = 50;

/// Payout destination supplied on enrollment or update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrollInput {
    pub payout_method: PayoutMethod,
    pub provider_name: String,
    pub account_name: String,
    pub account_number: String,
}

fn check_field(name: &str, value: &str, max: usize) -> Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LedgerError::validation(format!("{name} is required")));
    }
    if value.chars().count() > max {
        return Err(LedgerError::validation(format!(
            "{name} must be at most {max} characters"
        )));
    }
    Ok(())
}

impl EnrollInput {
    pub fn validate(&self) -> Result<()> {
        check_field("provider_name", &self.provider_name, MAX_PROVIDER_LEN)?;
        check_field("account_name", &self.account_name, MAX_ACCOUNT_NAME_LEN)?;
        check_field(
            "account_number",
            &self.account_number,
            MAX_ACCOUNT_NUMBER_LEN,
        )
    }
}

/// Decrypted payout destination for presentation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDetails {
    pub payout_method: PayoutMethod,
    pub provider_name: String,
    pub account_name: String,
    pub account_number: String,
}

impl PayoutDetails {
    pub fn decrypt(
        profile: &affiliate_profile::Model,
        encryption: &dyn EncryptionService,
    ) -> Result<Self> {
        Ok(Self {
            payout_method: profile.payout_method,
            provider_name: profile.provider_name.clone(),
            account_name: encryption.decrypt(&profile.payout_name_encrypted)?,
            account_number: encryption.decrypt(&profile.payout_number_encrypted)?,
        })
    }

    /// The form shown to the account owner.
    pub fn masked(self) -> Self {
        Self {
            account_name: mask_string(&self.account_name),
            account_number: mask_string(&self.account_number),
            ..self
        }
    }
}

impl Ledger {
    /// Enrolls `user` in the program with a PENDING profile and zero balances.
    #[tracing::instrument(name = "ledger::enroll", skip(self, input, settings, encryption))]
    pub async fn enroll(
        &self,
        user: &Actor,
        input: EnrollInput,
        settings: &AffiliateSettings,
        encryption: &dyn EncryptionService,
    ) -> Result<affiliate_profile::Model> {
        if !settings.enabled {
            return Err(LedgerError::validation(
                "the affiliate program is currently disabled",
            ));
        }
        input.validate()?;

        let existing = affiliate_profile::Entity::find()
            .filter(affiliate_profile::Column::UserId.eq(user.id.as_str()))
            .count(&self.db)
            .await?;
        if existing > 0 {
            return Err(LedgerError::conflict("user is already enrolled"));
        }

        let payout_name = encryption.encrypt(input.account_name.trim())?;
        let payout_number = encryption.encrypt(input.account_number.trim())?;
        let now = chrono::Utc::now().naive_utc();

        let profile = affiliate_profile::ActiveModel {
            id: Set(new_id()),
            user_id: Set(user.id.clone()),
            status: Set(AffiliateStatus::Pending),
            payout_method: Set(input.payout_method),
            provider_name: Set(input.provider_name.trim().to_string()),
            payout_name_encrypted: Set(payout_name),
            payout_number_encrypted: Set(payout_number),
            total_earnings: Set(0),
            total_paid: Set(0),
            pending_balance: Set(0),
            available_balance: Set(0),
            locked_balance: Set(0),
            is_blocked: Set(false),
            is_suspicious: Set(false),
            blocked_reason: Set(None),
            blocked_at: Set(None),
            approved_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(|e| LedgerError::from_insert(e, "user is already enrolled"))?;

        tracing::info!("User {} enrolled as affiliate {}", user.id, profile.id);
        self.audit(user.audit_entry("affiliate.enroll", "affiliate_profile", profile.id.clone()))
            .await;

        Ok(profile)
    }

    /// Replaces the stored payout destination.
    #[tracing::instrument(name = "ledger::update_payout_info", skip(self, input, encryption))]
    pub async fn update_payout_info(
        &self,
        user: &Actor,
        input: EnrollInput,
        encryption: &dyn EncryptionService,
    ) -> Result<affiliate_profile::Model> {
        input.validate()?;
        let payout_name = encryption.encrypt(input.account_name.trim())?;
        let payout_number = encryption.encrypt(input.account_number.trim())?;

        let uow = UnitOfWork::begin(&self.db).await?;
        let profile = uow.lock_profile_by_user(&user.id).await?;

        let mut model: affiliate_profile::ActiveModel = profile.into();
        model.payout_method = Set(input.payout_method);
        model.provider_name = Set(input.provider_name.trim().to_string());
        model.payout_name_encrypted = Set(payout_name);
        model.payout_number_encrypted = Set(payout_number);
        model.updated_at = Set(uow.now());
        let profile = model.update(uow.txn()).await?;
        uow.commit().await?;

        self.audit(user.audit_entry(
            "affiliate.update_payout_info",
            "affiliate_profile",
            profile.id.clone(),
        ))
        .await;

        Ok(profile)
    }

    /// Admin review decision. Approval stamps `approved_at`.
    #[tracing::instrument(name = "ledger::update_profile_status", skip(self))]
    pub async fn update_profile_status(
        &self,
        profile_id: &str,
        status: AffiliateStatus,
        admin: &Actor,
    ) -> Result<affiliate_profile::Model> {
        if status == AffiliateStatus::Pending {
            return Err(LedgerError::validation(
                "status must be APPROVED, REJECTED or SUSPENDED",
            ));
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let profile = uow.lock_profile(profile_id).await?;
        let previous = profile.status;

        let mut model: affiliate_profile::ActiveModel = profile.into();
        model.status = Set(status);
        if status == AffiliateStatus::Approved {
            model.approved_at = Set(Some(uow.now()));
        }
        model.updated_at = Set(uow.now());
        let profile = model.update(uow.txn()).await?;
        uow.commit().await?;

        tracing::info!(
            "Affiliate {} moved from {:?} to {:?} by {}",
            profile.id,
            previous,
            status,
            admin.id
        );
        self.audit(
            admin
                .audit_entry("affiliate.status", "affiliate_profile", profile.id.clone())
                .json(json!({ "from": previous, "to": status })),
        )
        .await;

        Ok(profile)
    }

    /// Blocks or unblocks the affiliate owned by `user_id`. A blocked affiliate
    /// cannot request payouts or earn referral commissions.
    #[tracing::instrument(name = "ledger::block_affiliate", skip(self, reason))]
    pub async fn block_affiliate(
        &self,
        user_id: &str,
        blocked: bool,
        reason: Option<&str>,
        admin: &Actor,
    ) -> Result<affiliate_profile::Model> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if blocked && reason.is_none() {
            return Err(LedgerError::validation("a reason is required to block"));
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let profile = uow.lock_profile_by_user(user_id).await?;

        let mut model: affiliate_profile::ActiveModel = profile.into();
        model.is_blocked = Set(blocked);
        if blocked {
            model.blocked_reason = Set(reason.map(str::to_string));
            model.blocked_at = Set(Some(uow.now()));
        } else {
            model.blocked_reason = Set(None);
            model.blocked_at = Set(None);
        }
        model.updated_at = Set(uow.now());
        let profile = model.update(uow.txn()).await?;
        uow.commit().await?;

        let action = if blocked {
            "affiliate.block"
        } else {
            "affiliate.unblock"
        };
        let mut entry = admin.audit_entry(action, "affiliate_profile", profile.id.clone());
        if let Some(reason) = reason {
            entry = entry.details(reason);
        }
        self.audit(entry).await;

        Ok(profile)
    }

    #[tracing::instrument(name = "ledger::flag_suspicious", skip(self))]
    pub async fn flag_suspicious(
        &self,
        user_id: &str,
        suspicious: bool,
        admin: &Actor,
    ) -> Result<affiliate_profile::Model> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let profile = uow.lock_profile_by_user(user_id).await?;

        let mut model: affiliate_profile::ActiveModel = profile.into();
        model.is_suspicious = Set(suspicious);
        model.updated_at = Set(uow.now());
        let profile = model.update(uow.txn()).await?;
        uow.commit().await?;

        self.audit(
            admin
                .audit_entry("affiliate.flag", "affiliate_profile", profile.id.clone())
                .json(json!({ "suspicious": suspicious })),
        )
        .await;

        Ok(profile)
    }
}
