pub use super::affiliate_profile::Entity as AffiliateProfile;
pub use super::affiliate_settings::Entity as AffiliateSettings;
pub use super::audit_log::Entity as AuditLog;
pub use super::balance_adjustment::Entity as BalanceAdjustment;
pub use super::commission::Entity as Commission;
pub use super::payout_request::Entity as PayoutRequest;
pub use super::referral_event::Entity as ReferralEvent;
pub use super::user::Entity as User;
