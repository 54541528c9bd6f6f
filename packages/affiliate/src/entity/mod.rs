//! `SeaORM` entities for the affiliate ledger tables

pub mod prelude;

pub mod affiliate_profile;
pub mod affiliate_settings;
pub mod audit_log;
pub mod balance_adjustment;
pub mod commission;
pub mod payout_request;
pub mod referral_event;
pub mod sea_orm_active_enums;
pub mod user;
