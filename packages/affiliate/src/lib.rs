//! Affiliate commission ledger.
//!
//! Referral sign-ups are tracked by [`ReferralTracker`]. Verified referrals
//! accrue commissions into a held `pending` bucket, the hold release job moves
//! them to `available`, and payouts move money through `locked` into `paid`
//! under admin control. All balance changes go through [`Ledger`].

pub mod collaborators;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod referral;
pub mod schema;
pub mod settings;

pub use sea_orm;

pub use error::{LedgerError, Result};
pub use ledger::{Actor, Balances, Bucket, Ledger, Page, PageRequest};
pub use referral::ReferralTracker;
pub use settings::{AffiliateSettings, SettingsStore, UpdateSettingsInput};
