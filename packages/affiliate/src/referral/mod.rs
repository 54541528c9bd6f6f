//! Referral sign-up tracking and anti-farming checks.
//!
//! Anti-abuse checks fail open: an unreachable counter never blocks a sign-up.

pub mod throttle;

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
    prelude::Expr,
    sea_query::{Order, SimpleExpr},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::collaborators::{
    AuditSink, DbAuditLog, DbUserDirectory, DirectoryUser, UserDirectory,
    audit::record_best_effort,
};
use crate::entity::referral_event;
use crate::error::{LedgerError, Result};
use crate::ledger::Actor;

pub use throttle::{IpThrottle, MemoryIpThrottle, ThrottleBackend, ThrottleError, create_ip_throttle};

#[cfg(feature = "redis")]
pub use throttle::RedisIpThrottle;

const TOP_REFERRERS: u64 = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopReferrer {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub total_referrals: u64,
    pub verified_referrals: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
    pub total_invites: u64,
    pub verified_referrals: u64,
    pub top_referrers: Vec<TopReferrer>,
}

#[derive(Clone)]
pub struct ReferralTracker {
    db: DatabaseConnection,
    directory: Arc<dyn UserDirectory>,
    audit: Arc<dyn AuditSink>,
    throttle: Option<Arc<dyn IpThrottle>>,
}

impl std::fmt::Debug for ReferralTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferralTracker")
            .field(
                "throttle",
                &self.throttle.as_ref().map(|t| t.backend_name()),
            )
            .finish_non_exhaustive()
    }
}

impl ReferralTracker {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            directory: Arc::new(DbUserDirectory::new(db.clone())),
            audit: Arc::new(DbAuditLog::new(db.clone())),
            throttle: None,
            db,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_throttle(mut self, throttle: Arc<dyn IpThrottle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Maps a referral code to the active user who owns it.
    pub async fn resolve_referrer(&self, code: &str) -> Result<Option<DirectoryUser>> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        self.directory.find_active_by_referral_code(code).await
    }

    /// Records an unverified sign-up of `referred_id` through `referrer_id`.
    #[tracing::instrument(name = "referral::record", skip(self))]
    pub async fn record_referral(
        &self,
        referrer_id: &str,
        referred_id: &str,
        ip_address: Option<&str>,
    ) -> Result<referral_event::Model> {
        if referrer_id.trim().is_empty() || referred_id.trim().is_empty() {
            return Err(LedgerError::validation(
                "referrer and referred user are required",
            ));
        }
        if referrer_id == referred_id {
            return Err(LedgerError::validation("users cannot refer themselves"));
        }

        let existing = referral_event::Entity::find()
            .filter(referral_event::Column::ReferredId.eq(referred_id))
            .count(&self.db)
            .await?;
        if existing > 0 {
            return Err(LedgerError::conflict(format!(
                "user {referred_id} was already referred"
            )));
        }

        let ip_address = ip_address.map(str::trim).filter(|ip| !ip.is_empty());
        let event = referral_event::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            referrer_id: Set(referrer_id.to_string()),
            referred_id: Set(referred_id.to_string()),
            ip_address: Set(ip_address.map(str::to_string)),
            verified: Set(false),
            created_at: Set(chrono::Utc::now().naive_utc()),
        }
        .insert(&self.db)
        .await
        .map_err(|e| {
            LedgerError::from_insert(e, format!("user {referred_id} was already referred"))
        })?;

        tracing::info!("Recorded referral of {} by {}", referred_id, referrer_id);
        let mut actor = Actor::new(referred_id);
        actor.ip = event.ip_address.clone();
        record_best_effort(
            self.audit.as_ref(),
            actor
                .audit_entry("referral.record", "referral_event", event.id.clone())
                .json(json!({ "referrer_id": referrer_id })),
        )
        .await;

        Ok(event)
    }

    /// Flips the referral of `referred_id` to verified. Returns the event only
    /// when this call performed the flip.
    #[tracing::instrument(name = "referral::mark_verified", skip(self))]
    pub async fn mark_verified(&self, referred_id: &str) -> Result<Option<referral_event::Model>> {
        let result = referral_event::Entity::update_many()
            .col_expr(referral_event::Column::Verified, Expr::value(true))
            .filter(referral_event::Column::ReferredId.eq(referred_id))
            .filter(referral_event::Column::Verified.eq(false))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }

        let event = referral_event::Entity::find()
            .filter(referral_event::Column::ReferredId.eq(referred_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| LedgerError::not_found("referral event", referred_id))?;

        tracing::info!("Referral of {} verified", referred_id);
        record_best_effort(
            self.audit.as_ref(),
            Actor::system().audit_entry("referral.verify", "referral_event", event.id.clone()),
        )
        .await;

        Ok(Some(event))
    }

    /// Whether `ip` already produced `max_per_day` referrals in the trailing
    /// 24 hours. A limit of zero disables the check. Errors count as "not
    /// abusive".
    #[tracing::instrument(name = "referral::check_ip_limit", skip(self))]
    pub async fn check_ip_referral_limit(&self, ip: &str, max_per_day: u64) -> bool {
        let ip = ip.trim();
        if ip.is_empty() || max_per_day == 0 {
            return false;
        }

        if let Some(throttle) = &self.throttle {
            match throttle.hit(ip).await {
                Ok(count) if count > max_per_day => {
                    tracing::warn!(
                        "IP {} exceeded {} referrals per day ({} backend)",
                        ip,
                        max_per_day,
                        throttle.backend_name()
                    );
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Referral throttle unavailable, failing open: {}", e);
                }
            }
        }

        let since = chrono::Utc::now().naive_utc() - chrono::Duration::hours(24);
        match referral_event::Entity::find()
            .filter(referral_event::Column::IpAddress.eq(ip))
            .filter(referral_event::Column::CreatedAt.gte(since))
            .count(&self.db)
            .await
        {
            Ok(count) => count >= max_per_day,
            Err(e) => {
                tracing::warn!("Referral IP count failed, failing open: {}", e);
                false
            }
        }
    }

    #[tracing::instrument(name = "referral::stats", skip(self))]
    pub async fn referral_stats(&self) -> Result<ReferralStats> {
        let total_invites = referral_event::Entity::find().count(&self.db).await?;
        let verified_referrals = referral_event::Entity::find()
            .filter(referral_event::Column::Verified.eq(true))
            .count(&self.db)
            .await?;

        let verified_count: SimpleExpr =
            Expr::cust("SUM(CASE WHEN verified THEN 1 ELSE 0 END)");
        let rows = referral_event::Entity::find()
            .select_only()
            .column(referral_event::Column::ReferrerId)
            .column_as(
                Expr::col(referral_event::Column::Id).count(),
                "total_referrals",
            )
            .column_as(verified_count, "verified_referrals")
            .group_by(referral_event::Column::ReferrerId)
            .order_by(Expr::cust("total_referrals"), Order::Desc)
            .limit(TOP_REFERRERS)
            .into_tuple::<(String, i64, i64)>()
            .all(&self.db)
            .await?;

        let user_ids: Vec<String> = rows.iter().map(|(id, _, _)| id.clone()).collect();
        let users = self.directory.find_users(&user_ids).await?;

        let top_referrers = rows
            .into_iter()
            .map(|(user_id, total, verified)| {
                let user = users.get(&user_id);
                TopReferrer {
                    name: user.map(|u| u.name.clone()),
                    email: user.map(|u| u.email.clone()),
                    total_referrals: total.max(0) as u64,
                    verified_referrals: verified.max(0) as u64,
                    user_id,
                }
            })
            .collect();

        Ok(ReferralStats {
            total_invites,
            verified_referrals,
            top_referrers,
        })
    }
}
