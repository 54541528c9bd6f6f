mod common;

use common::*;
use netpulse_affiliate::{
    Actor, LedgerError, SettingsStore, UpdateSettingsInput,
    collaborators::AesGcmEncryption,
    entity::sea_orm_active_enums::{AffiliateStatus, PayoutMethod},
    ledger::{EnrollInput, PageRequest, ProfileFilter},
};

#[tokio::test]
async fn enrollment_encrypts_payout_details() {
    let env = setup().await;
    create_user(&env.db, "alice", "Alice Smith").await;

    let profile = env
        .ledger
        .enroll(
            &Actor::new("alice"),
            enroll_input(),
            &env.settings,
            &env.encryption,
        )
        .await
        .unwrap();
    assert_eq!(profile.status, AffiliateStatus::Pending);
    assert!(profile.approved_at.is_none());
    assert_ne!(profile.payout_number_encrypted, "1234567890");

    let details = env
        .ledger
        .payout_details("alice", &env.encryption)
        .await
        .unwrap();
    assert_eq!(details.account_number, "1234567890");
    let masked = details.masked();
    assert_eq!(masked.account_name, "**** Doe");
    assert_eq!(masked.account_number, "****7890");

    let other_key = AesGcmEncryption::from_hex(&"ab".repeat(32)).unwrap();
    let err = env
        .ledger
        .payout_details("alice", &other_key)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Encryption(_)));

    let err = env
        .ledger
        .enroll(
            &Actor::new("alice"),
            enroll_input(),
            &env.settings,
            &env.encryption,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)));
}

#[tokio::test]
async fn enrollment_requires_an_open_program_and_valid_details() {
    let env = setup().await;
    create_user(&env.db, "bob", "Bob").await;

    let err = env
        .ledger
        .enroll(
            &Actor::new("bob"),
            EnrollInput {
                account_number: "9".repeat(51),
                ..enroll_input()
            },
            &env.settings,
            &env.encryption,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let closed = SettingsStore::update(
        &env.db,
        UpdateSettingsInput {
            enabled: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let err = env
        .ledger
        .enroll(&Actor::new("bob"), enroll_input(), &closed, &env.encryption)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(env.ledger.find_profile_by_user("bob").await.unwrap().is_none());
}

#[tokio::test]
async fn payout_info_can_be_replaced() {
    let env = setup().await;
    approved_affiliate(&env, "carol").await;

    let updated = env
        .ledger
        .update_payout_info(
            &Actor::new("carol"),
            EnrollInput {
                payout_method: PayoutMethod::Ewallet,
                provider_name: "GoPay".into(),
                account_name: "Carol Q".into(),
                account_number: "081200001111".into(),
            },
            &env.encryption,
        )
        .await
        .unwrap();
    assert_eq!(updated.payout_method, PayoutMethod::Ewallet);
    assert_eq!(updated.status, AffiliateStatus::Approved);

    let details = env
        .ledger
        .payout_details("carol", &env.encryption)
        .await
        .unwrap();
    assert_eq!(details.provider_name, "GoPay");
    assert_eq!(details.account_number, "081200001111");

    let err = env
        .ledger
        .update_payout_info(&Actor::new("nobody"), enroll_input(), &env.encryption)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[tokio::test]
async fn moderation_updates_flags_and_status() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "dave").await;
    assert!(profile.approved_at.is_some());

    let err = env
        .ledger
        .update_profile_status(&profile.id, AffiliateStatus::Pending, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = env
        .ledger
        .block_affiliate("dave", true, Some("  "), &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let blocked = env
        .ledger
        .block_affiliate("dave", true, Some("chargebacks"), &admin())
        .await
        .unwrap();
    assert!(blocked.is_blocked);
    assert_eq!(blocked.blocked_reason.as_deref(), Some("chargebacks"));
    assert!(blocked.blocked_at.is_some());

    let flagged = env
        .ledger
        .flag_suspicious("dave", true, &admin())
        .await
        .unwrap();
    assert!(flagged.is_suspicious);

    let suspended = env
        .ledger
        .update_profile_status(&profile.id, AffiliateStatus::Suspended, &admin())
        .await
        .unwrap();
    assert_eq!(suspended.status, AffiliateStatus::Suspended);
    assert!(suspended.is_blocked);
}

#[tokio::test]
async fn profile_listing_filters_and_searches() {
    let env = setup().await;
    approved_affiliate(&env, "erin").await;
    approved_affiliate(&env, "frank").await;
    create_user(&env.db, "gail", "Gail Pending").await;
    env.ledger
        .enroll(
            &Actor::new("gail"),
            enroll_input(),
            &env.settings,
            &env.encryption,
        )
        .await
        .unwrap();

    let pending = env
        .ledger
        .list_profiles(
            ProfileFilter {
                status: Some(AffiliateStatus::Pending),
                search: None,
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(pending.total, 1);
    assert_eq!(
        pending.items[0].user.as_ref().map(|u| u.email.as_str()),
        Some("gail@example.com")
    );

    let by_email = env
        .ledger
        .list_profiles(
            ProfileFilter {
                status: None,
                search: Some("FRANK@".into()),
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_email.total, 1);
    assert_eq!(by_email.items[0].profile.user_id, "frank");

    let none = env
        .ledger
        .list_profiles(
            ProfileFilter {
                status: None,
                search: Some("zzz".into()),
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(none.total, 0);
    assert!(none.items.is_empty());

    for wildcard in ["%", "_"] {
        let literal = env
            .ledger
            .list_profiles(
                ProfileFilter {
                    status: None,
                    search: Some(wildcard.into()),
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(literal.total, 0, "{wildcard} must match literally");
    }

    let all = env
        .ledger
        .list_profiles(ProfileFilter::default(), PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!((all.total, all.total_pages, all.items.len()), (3, 2, 1));
}

#[tokio::test]
async fn stats_reflect_the_ledger() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "hank").await;
    fund_available(&env, &profile, 300).await;
    env.ledger
        .grant_commission(&profile.id, None, 40, "referral", 7)
        .await
        .unwrap();

    let payout = env
        .ledger
        .request_payout(&env.settings, &Actor::new("hank"), 200, None)
        .await
        .unwrap();

    let stats = env.ledger.user_stats("hank").await.unwrap();
    assert!(stats.enrolled);
    assert_eq!(stats.status, Some(AffiliateStatus::Approved));
    assert_eq!(
        (
            stats.pending_balance,
            stats.available_balance,
            stats.total_earnings
        ),
        (40, 300, 340)
    );
    assert_eq!(stats.this_month_earnings, 340);

    let admin_stats = env.ledger.admin_stats().await.unwrap();
    assert_eq!(admin_stats.total_affiliates, 1);
    assert_eq!(admin_stats.active_affiliates, 1);
    assert_eq!(admin_stats.pending_payouts, 1);
    assert_eq!(admin_stats.pending_payout_amount, 200);
    assert_eq!(admin_stats.total_paid_out, 0);
    assert_eq!(admin_stats.total_commissions, 340);
    assert_eq!(admin_stats.top_affiliates[0].user_id, "hank");

    env.ledger
        .approve_payout(&payout.id, None, &admin())
        .await
        .unwrap();
    env.ledger
        .mark_paid(&payout.id, None, &admin(), None, None)
        .await
        .unwrap();
    let admin_stats = env.ledger.admin_stats().await.unwrap();
    assert_eq!(
        (admin_stats.pending_payouts, admin_stats.total_paid_out),
        (0, 200)
    );
}
