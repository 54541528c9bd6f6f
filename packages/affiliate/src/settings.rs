//! Program-wide affiliate settings.
//!
//! The settings row is loaded explicitly and passed by reference into the
//! operations that depend on it.

use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};

use crate::entity::{
    affiliate_settings,
    sea_orm_active_enums::{CommissionType, PayoutSchedule},
};
use crate::error::{LedgerError, Result};

pub type AffiliateSettings = affiliate_settings::Model;

pub const SETTINGS_ID: i32 = 1;

/// Basis points in one whole.
pub const BASIS_POINTS: i64 = 10_000;

/// Upper bound for `cookie_days` and `referral_hold_days`.
pub const MAX_DAYS: i32 = 3_650;

impl affiliate_settings::Model {
    /// Commission owed for one qualifying event.
    ///
    /// Fixed types pay `commission_value`. `PERCENTAGE` pays
    /// `base * commission_value / 10_000`, rounded down.
    pub fn commission_for(&self, base: Option<i64>) -> Result<i64> {
        match self.commission_type {
            CommissionType::FixedPerVerifiedReferral | CommissionType::Fixed => {
                Ok(self.commission_value)
            }
            CommissionType::Percentage => {
                let base = base.ok_or_else(|| {
                    LedgerError::validation("percentage commission requires a base amount")
                })?;
                if base < 0 {
                    return Err(LedgerError::validation("base amount cannot be negative"));
                }
                let amount = (base as i128 * self.commission_value as i128) / BASIS_POINTS as i128;
                i64::try_from(amount)
                    .map_err(|_| LedgerError::validation("commission amount overflows"))
            }
        }
    }

    pub fn hold_days(&self) -> i64 {
        i64::from(self.referral_hold_days)
    }
}

fn default_settings(now: chrono::NaiveDateTime) -> affiliate_settings::ActiveModel {
    affiliate_settings::ActiveModel {
        id: Set(SETTINGS_ID),
        enabled: Set(true),
        commission_type: Set(CommissionType::FixedPerVerifiedReferral),
        commission_value: Set(10_000),
        cookie_days: Set(30),
        referral_hold_days: Set(7),
        payout_minimum: Set(50_000),
        payout_schedule: Set(PayoutSchedule::Manual),
        how_it_works_md: Set(String::new()),
        terms_md: Set(String::new()),
        payout_rules_md: Set(String::new()),
        updated_at: Set(now),
    }
}

/// Partial update; `None` leaves the field as it is.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateSettingsInput {
    pub enabled: Option<bool>,
    pub commission_type: Option<CommissionType>,
    pub commission_value: Option<i64>,
    pub cookie_days: Option<i32>,
    pub referral_hold_days: Option<i32>,
    pub payout_minimum: Option<i64>,
    pub payout_schedule: Option<PayoutSchedule>,
    pub how_it_works_md: Option<String>,
    pub terms_md: Option<String>,
    pub payout_rules_md: Option<String>,
}

impl UpdateSettingsInput {
    fn validate(&self, current: &AffiliateSettings) -> Result<()> {
        if self.commission_value.is_some_and(|v| v < 0) {
            return Err(LedgerError::validation("commission_value cannot be negative"));
        }
        let commission_type = self.commission_type.unwrap_or(current.commission_type);
        let commission_value = self.commission_value.unwrap_or(current.commission_value);
        if commission_type == CommissionType::Percentage && commission_value > BASIS_POINTS {
            return Err(LedgerError::validation(
                "percentage commission cannot exceed 10000 basis points",
            ));
        }
        if self.cookie_days.is_some_and(|v| !(0..=MAX_DAYS).contains(&v)) {
            return Err(LedgerError::validation(format!(
                "cookie_days must be between 0 and {MAX_DAYS}"
            )));
        }
        if self.referral_hold_days.is_some_and(|v| !(0..=MAX_DAYS).contains(&v)) {
            return Err(LedgerError::validation(format!(
                "referral_hold_days must be between 0 and {MAX_DAYS}"
            )));
        }
        if self.payout_minimum.is_some_and(|v| v < 0) {
            return Err(LedgerError::validation("payout_minimum cannot be negative"));
        }
        Ok(())
    }
}

pub struct SettingsStore;

impl SettingsStore {
    pub async fn load<C: ConnectionTrait>(db: &C) -> Result<AffiliateSettings> {
        affiliate_settings::Entity::find_by_id(SETTINGS_ID)
            .one(db)
            .await?
            .ok_or_else(|| LedgerError::not_found("affiliate settings", SETTINGS_ID.to_string()))
    }

    /// Loads the settings row, inserting the defaults when it does not exist.
    pub async fn ensure_default<C: ConnectionTrait>(db: &C) -> Result<AffiliateSettings> {
        if let Some(settings) = affiliate_settings::Entity::find_by_id(SETTINGS_ID)
            .one(db)
            .await?
        {
            return Ok(settings);
        }
        tracing::info!("Creating default affiliate settings");
        let settings = default_settings(chrono::Utc::now().naive_utc())
            .insert(db)
            .await?;
        Ok(settings)
    }

    #[tracing::instrument(name = "settings::update", skip(db))]
    pub async fn update<C: ConnectionTrait>(
        db: &C,
        input: UpdateSettingsInput,
    ) -> Result<AffiliateSettings> {
        let current = Self::ensure_default(db).await?;
        input.validate(&current)?;

        let mut model: affiliate_settings::ActiveModel = current.into();
        if let Some(v) = input.enabled {
            model.enabled = Set(v);
        }
        if let Some(v) = input.commission_type {
            model.commission_type = Set(v);
        }
        if let Some(v) = input.commission_value {
            model.commission_value = Set(v);
        }
        if let Some(v) = input.cookie_days {
            model.cookie_days = Set(v);
        }
        if let Some(v) = input.referral_hold_days {
            model.referral_hold_days = Set(v);
        }
        if let Some(v) = input.payout_minimum {
            model.payout_minimum = Set(v);
        }
        if let Some(v) = input.payout_schedule {
            model.payout_schedule = Set(v);
        }
        if let Some(v) = input.how_it_works_md {
            model.how_it_works_md = Set(v);
        }
        if let Some(v) = input.terms_md {
            model.terms_md = Set(v);
        }
        if let Some(v) = input.payout_rules_md {
            model.payout_rules_md = Set(v);
        }
        model.updated_at = Set(chrono::Utc::now().naive_utc());

        Ok(model.update(db).await?)
    }
}
