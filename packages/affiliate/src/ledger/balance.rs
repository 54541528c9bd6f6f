//! Balance buckets and the signed deltas applied to them.

use serde::{Deserialize, Serialize};

use crate::entity::{affiliate_profile, sea_orm_active_enums::AdjustmentBucket};
use crate::error::LedgerError;

/// A money column on the affiliate profile.
///
/// `Earnings` is the lifetime bookkeeping column; the other four hold value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Pending,
    Available,
    Locked,
    Paid,
    Earnings,
}

impl Bucket {
    pub fn column(self) -> affiliate_profile::Column {
        match self {
            Self::Pending => affiliate_profile::Column::PendingBalance,
            Self::Available => affiliate_profile::Column::AvailableBalance,
            Self::Locked => affiliate_profile::Column::LockedBalance,
            Self::Paid => affiliate_profile::Column::TotalPaid,
            Self::Earnings => affiliate_profile::Column::TotalEarnings,
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Locked => "locked",
            Self::Paid => "paid",
            Self::Earnings => "total earnings",
        };
        f.write_str(name)
    }
}

impl From<AdjustmentBucket> for Bucket {
    fn from(value: AdjustmentBucket) -> Self {
        match value {
            AdjustmentBucket::Pending => Self::Pending,
            AdjustmentBucket::Available => Self::Available,
            AdjustmentBucket::Paid => Self::Paid,
        }
    }
}

/// Snapshot of a profile's money columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub pending: i64,
    pub available: i64,
    pub locked: i64,
    pub paid: i64,
    pub earnings: i64,
}

impl Balances {
    pub fn get(&self, bucket: Bucket) -> i64 {
        match bucket {
            Bucket::Pending => self.pending,
            Bucket::Available => self.available,
            Bucket::Locked => self.locked,
            Bucket::Paid => self.paid,
            Bucket::Earnings => self.earnings,
        }
    }

    /// Sum of the four value-bearing buckets.
    pub fn held(&self) -> i64 {
        self.pending + self.available + self.locked + self.paid
    }

    /// No column is negative and lifetime earnings equal what is held.
    pub fn is_consistent(&self) -> bool {
        self.pending >= 0
            && self.available >= 0
            && self.locked >= 0
            && self.paid >= 0
            && self.earnings >= 0
            && self.earnings == self.held()
    }

    /// The first column the delta would drive below zero, as an error.
    pub fn shortfall(&self, delta: &BalanceDelta) -> Option<LedgerError> {
        delta.entries().into_iter().find_map(|(bucket, amount)| {
            let current = self.get(bucket);
            (current + amount < 0).then(|| LedgerError::InsufficientBalance {
                bucket,
                required: -amount,
                available: current,
            })
        })
    }

    pub fn apply(&self, delta: &BalanceDelta) -> Balances {
        Balances {
            pending: self.pending + delta.pending,
            available: self.available + delta.available,
            locked: self.locked + delta.locked,
            paid: self.paid + delta.paid,
            earnings: self.earnings + delta.earnings,
        }
    }
}

impl From<&affiliate_profile::Model> for Balances {
    fn from(profile: &affiliate_profile::Model) -> Self {
        Self {
            pending: profile.pending_balance,
            available: profile.available_balance,
            locked: profile.locked_balance,
            paid: profile.total_paid,
            earnings: profile.total_earnings,
        }
    }
}

/// Signed change to a profile's money columns, applied atomically.
///
/// Only the constructors below exist, so every mutation is either a transfer
/// between two buckets (sum preserved) or income that moves a bucket and
/// `Earnings` together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    pending: i64,
    available: i64,
    locked: i64,
    paid: i64,
    earnings: i64,
}

impl BalanceDelta {
    fn with(mut self, bucket: Bucket, amount: i64) -> Self {
        match bucket {
            Bucket::Pending => self.pending += amount,
            Bucket::Available => self.available += amount,
            Bucket::Locked => self.locked += amount,
            Bucket::Paid => self.paid += amount,
            Bucket::Earnings => self.earnings += amount,
        }
        self
    }

    /// Move `amount` from one bucket to another.
    pub fn transfer(from: Bucket, to: Bucket, amount: i64) -> Self {
        Self::default().with(from, -amount).with(to, amount)
    }

    /// New commission: pending and lifetime earnings grow together.
    pub fn accrual(amount: i64) -> Self {
        Self::default()
            .with(Bucket::Pending, amount)
            .with(Bucket::Earnings, amount)
    }

    /// Admin correction; `amount` may be negative.
    pub fn adjustment(bucket: AdjustmentBucket, amount: i64) -> Self {
        Self::default()
            .with(bucket.into(), amount)
            .with(Bucket::Earnings, amount)
    }

    pub fn is_zero(&self) -> bool {
        self.entries().is_empty()
    }

    /// Non-zero entries, in column order.
    pub fn entries(&self) -> Vec<(Bucket, i64)> {
        [
            (Bucket::Pending, self.pending),
            (Bucket::Available, self.available),
            (Bucket::Locked, self.locked),
            (Bucket::Paid, self.paid),
            (Bucket::Earnings, self.earnings),
        ]
        .into_iter()
        .filter(|(_, amount)| *amount != 0)
        .collect()
    }
}
