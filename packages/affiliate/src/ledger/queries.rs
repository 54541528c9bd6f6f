//! Read accessors: profiles, listings and dashboards.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select,
    prelude::Expr,
    sea_query::{Alias, Func, SimpleExpr},
};
use serde::{Deserialize, Serialize};

use super::{Ledger, profile::PayoutDetails};
use crate::collaborators::{DirectoryUser, EncryptionService};
use crate::entity::{
    affiliate_profile, commission, payout_request, referral_event,
    sea_orm_active_enums::{AffiliateStatus, PayoutStatus},
};
use crate::error::{LedgerError, Result};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;
const TOP_AFFILIATES: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page, limit }.normalized()
    }

    /// Pages are 1-based; a zero limit falls back to the default.
    pub fn normalized(self) -> Self {
        let limit = match self.limit {
            0 => DEFAULT_PAGE_SIZE,
            l => l.min(MAX_PAGE_SIZE),
        };
        Self {
            page: self.page.max(1),
            limit,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    fn empty(request: PageRequest) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: request.page,
            limit: request.limit,
            total_pages: 0,
        }
    }

    fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

async fn fetch_page<E, C>(query: Select<E>, db: &C, request: PageRequest) -> Result<Page<E::Model>>
where
    E: EntityTrait,
    E::Model: Send + Sync + 'static,
    C: ConnectionTrait,
{
    let request = request.normalized();
    let paginator = query.paginate(db, request.limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(request.page - 1).await?;
    Ok(Page {
        items,
        total,
        page: request.page,
        limit: request.limit,
        total_pages: total.div_ceil(request.limit),
    })
}

/// `COALESCE(SUM(col), 0)` cast to BIGINT so Postgres returns an integer.
async fn sum_of<E, C, Col>(query: Select<E>, column: Col, db: &C) -> Result<i64>
where
    E: EntityTrait,
    C: ConnectionTrait,
    Col: ColumnTrait,
{
    let total: SimpleExpr = Func::cast_as(
        Func::coalesce([
            SimpleExpr::from(Func::sum(Expr::col(column))),
            Expr::val(0i64).into(),
        ]),
        Alias::new("BIGINT"),
    )
    .into();

    let sum = query
        .select_only()
        .column_as(total, "total")
        .into_tuple::<i64>()
        .one(db)
        .await?;
    Ok(sum.unwrap_or(0))
}

fn month_start(now: NaiveDateTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(now)
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfileFilter {
    pub status: Option<AffiliateStatus>,
    /// Matches the owner's name or email.
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PayoutFilter {
    pub status: Option<PayoutStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileListItem {
    #[serde(flatten)]
    pub profile: affiliate_profile::Model,
    pub user: Option<DirectoryUser>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoutListItem {
    #[serde(flatten)]
    pub payout: payout_request::Model,
    pub user: Option<DirectoryUser>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub enrolled: bool,
    pub status: Option<AffiliateStatus>,
    pub total_referrals: u64,
    pub verified_referrals: u64,
    pub pending_balance: i64,
    pub available_balance: i64,
    pub locked_balance: i64,
    pub total_paid: i64,
    pub total_earnings: i64,
    pub this_month_earnings: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopAffiliate {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub total_earnings: i64,
    pub verified_referrals: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_affiliates: u64,
    pub active_affiliates: u64,
    pub pending_payouts: u64,
    pub pending_payout_amount: i64,
    pub total_paid_out: i64,
    pub total_commissions: i64,
    pub verified_referrals_last_30_days: u64,
    pub top_affiliates: Vec<TopAffiliate>,
}

impl Ledger {
    pub async fn get_profile(&self, profile_id: &str) -> Result<affiliate_profile::Model> {
        affiliate_profile::Entity::find_by_id(profile_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| LedgerError::not_found("affiliate profile", profile_id))
    }

    pub async fn find_profile_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<affiliate_profile::Model>> {
        Ok(affiliate_profile::Entity::find()
            .filter(affiliate_profile::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?)
    }

    pub async fn get_profile_by_user(&self, user_id: &str) -> Result<affiliate_profile::Model> {
        self.find_profile_by_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("affiliate profile", user_id))
    }

    /// Decrypted payout destination of `user_id`'s profile. Callers showing it
    /// to the owner should use [`PayoutDetails::masked`].
    pub async fn payout_details(
        &self,
        user_id: &str,
        encryption: &dyn EncryptionService,
    ) -> Result<PayoutDetails> {
        let profile = self.get_profile_by_user(user_id).await?;
        PayoutDetails::decrypt(&profile, encryption)
    }

    #[tracing::instrument(name = "ledger::list_profiles", skip(self))]
    pub async fn list_profiles(
        &self,
        filter: ProfileFilter,
        request: PageRequest,
    ) -> Result<Page<ProfileListItem>> {
        let mut query = affiliate_profile::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(affiliate_profile::Column::Status.eq(status));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let user_ids = self.directory.search_user_ids(search).await?;
            if user_ids.is_empty() {
                return Ok(Page::empty(request.normalized()));
            }
            query = query.filter(affiliate_profile::Column::UserId.is_in(user_ids));
        }

        let page = fetch_page(
            query.order_by_desc(affiliate_profile::Column::CreatedAt),
            &self.db,
            request,
        )
        .await?;

        let user_ids: Vec<String> = page.items.iter().map(|p| p.user_id.clone()).collect();
        let mut users = self.directory.find_users(&user_ids).await?;
        Ok(page.map(|profile| ProfileListItem {
            user: users.remove(&profile.user_id),
            profile,
        }))
    }

    pub async fn list_commissions(
        &self,
        affiliate_id: &str,
        request: PageRequest,
    ) -> Result<Page<commission::Model>> {
        fetch_page(
            commission::Entity::find()
                .filter(commission::Column::AffiliateId.eq(affiliate_id))
                .order_by_desc(commission::Column::CreatedAt),
            &self.db,
            request,
        )
        .await
    }

    pub async fn list_user_payouts(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<Page<payout_request::Model>> {
        fetch_page(
            payout_request::Entity::find()
                .filter(payout_request::Column::UserId.eq(user_id))
                .order_by_desc(payout_request::Column::RequestedAt),
            &self.db,
            request,
        )
        .await
    }

    #[tracing::instrument(name = "ledger::list_payouts", skip(self))]
    pub async fn list_payouts(
        &self,
        filter: PayoutFilter,
        request: PageRequest,
    ) -> Result<Page<PayoutListItem>> {
        let mut query = payout_request::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(payout_request::Column::Status.eq(status));
        }

        let page = fetch_page(
            query.order_by_desc(payout_request::Column::RequestedAt),
            &self.db,
            request,
        )
        .await?;

        let user_ids: Vec<String> = page.items.iter().map(|p| p.user_id.clone()).collect();
        let users = self.directory.find_users(&user_ids).await?;
        Ok(page.map(|payout| PayoutListItem {
            user: users.get(&payout.user_id).cloned(),
            payout,
        }))
    }

    /// Dashboard numbers for one user. Users who never enrolled get zero
    /// balances but still see their referral counts.
    pub async fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        let total_referrals = referral_event::Entity::find()
            .filter(referral_event::Column::ReferrerId.eq(user_id))
            .count(&self.db)
            .await?;
        let verified_referrals = referral_event::Entity::find()
            .filter(referral_event::Column::ReferrerId.eq(user_id))
            .filter(referral_event::Column::Verified.eq(true))
            .count(&self.db)
            .await?;

        let Some(profile) = self.find_profile_by_user(user_id).await? else {
            return Ok(UserStats {
                total_referrals,
                verified_referrals,
                ..Default::default()
            });
        };

        let this_month_earnings = sum_of(
            commission::Entity::find()
                .filter(commission::Column::AffiliateId.eq(profile.id.as_str()))
                .filter(
                    commission::Column::CreatedAt
                        .gte(month_start(chrono::Utc::now().naive_utc())),
                ),
            commission::Column::Amount,
            &self.db,
        )
        .await?;

        Ok(UserStats {
            enrolled: true,
            status: Some(profile.status),
            total_referrals,
            verified_referrals,
            pending_balance: profile.pending_balance,
            available_balance: profile.available_balance,
            locked_balance: profile.locked_balance,
            total_paid: profile.total_paid,
            total_earnings: profile.total_earnings,
            this_month_earnings,
        })
    }

    #[tracing::instrument(name = "ledger::admin_stats", skip(self))]
    pub async fn admin_stats(&self) -> Result<AdminStats> {
        let total_affiliates = affiliate_profile::Entity::find().count(&self.db).await?;
        let active_affiliates = affiliate_profile::Entity::find()
            .filter(affiliate_profile::Column::Status.eq(AffiliateStatus::Approved))
            .count(&self.db)
            .await?;

        let pending = payout_request::Entity::find()
            .filter(payout_request::Column::Status.eq(PayoutStatus::Pending));
        let pending_payouts = pending.clone().count(&self.db).await?;
        let pending_payout_amount =
            sum_of(pending, payout_request::Column::Amount, &self.db).await?;

        let total_paid_out = sum_of(
            payout_request::Entity::find()
                .filter(payout_request::Column::Status.eq(PayoutStatus::Paid)),
            payout_request::Column::Amount,
            &self.db,
        )
        .await?;
        let total_commissions = sum_of(
            commission::Entity::find(),
            commission::Column::Amount,
            &self.db,
        )
        .await?;

        let since = chrono::Utc::now().naive_utc() - Duration::days(30);
        let verified_referrals_last_30_days = referral_event::Entity::find()
            .filter(referral_event::Column::Verified.eq(true))
            .filter(referral_event::Column::CreatedAt.gte(since))
            .count(&self.db)
            .await?;

        let top_affiliates = self.top_affiliates().await?;

        Ok(AdminStats {
            total_affiliates,
            active_affiliates,
            pending_payouts,
            pending_payout_amount,
            total_paid_out,
            total_commissions,
            verified_referrals_last_30_days,
            top_affiliates,
        })
    }

    async fn top_affiliates(&self) -> Result<Vec<TopAffiliate>> {
        let profiles = affiliate_profile::Entity::find()
            .filter(affiliate_profile::Column::Status.eq(AffiliateStatus::Approved))
            .order_by_desc(affiliate_profile::Column::TotalEarnings)
            .limit(TOP_AFFILIATES)
            .all(&self.db)
            .await?;
        if profiles.is_empty() {
            return Ok(Vec::new());
        }

        let user_ids: Vec<String> = profiles.iter().map(|p| p.user_id.clone()).collect();
        let verified: std::collections::HashMap<String, i64> = referral_event::Entity::find()
            .select_only()
            .column(referral_event::Column::ReferrerId)
            .column_as(Expr::col(referral_event::Column::Id).count(), "verified")
            .filter(referral_event::Column::Verified.eq(true))
            .filter(referral_event::Column::ReferrerId.is_in(user_ids.clone()))
            .group_by(referral_event::Column::ReferrerId)
            .into_tuple::<(String, i64)>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();
        let users = self.directory.find_users(&user_ids).await?;

        Ok(profiles
            .into_iter()
            .map(|p| {
                let user = users.get(&p.user_id);
                TopAffiliate {
                    name: user.map(|u| u.name.clone()),
                    email: user.map(|u| u.email.clone()),
                    total_earnings: p.total_earnings,
                    verified_referrals: verified
                        .get(&p.user_id)
                        .copied()
                        .unwrap_or(0)
                        .max(0) as u64,
                    user_id: p.user_id,
                }
            })
            .collect())
    }
}
