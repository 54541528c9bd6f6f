mod common;

use std::sync::Arc;

use chrono::Duration;
use common::*;
use netpulse_affiliate::{
    Actor, Balances, Bucket, LedgerError,
    entity::sea_orm_active_enums::PayoutStatus,
    ledger::{AdjustBalanceInput, PageRequest, PayoutFilter},
};

#[tokio::test]
async fn full_payout_scenario_keeps_the_books_balanced() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "alice").await;
    let alice = Actor::new("alice");

    env.ledger
        .grant_commission(&profile.id, None, 100, "Verified referral", 7)
        .await
        .unwrap();
    let b = balances(&env, &profile.id).await;
    assert_eq!((b.pending, b.available, b.earnings), (100, 0, 100));

    assert_eq!(env.ledger.release_held_commissions().await.unwrap(), 0);

    let later = chrono::Utc::now().naive_utc() + Duration::days(8);
    assert_eq!(
        env.ledger.release_held_commissions_at(later).await.unwrap(),
        1
    );
    let b = balances(&env, &profile.id).await;
    assert_eq!((b.pending, b.available), (0, 100));

    let payout = env
        .ledger
        .request_payout(&env.settings, &alice, 80, Some("first payout"))
        .await
        .unwrap();
    assert_eq!(payout.status, PayoutStatus::Pending);
    assert_eq!(payout.note.as_deref(), Some("first payout"));
    assert_eq!(balances(&env, &profile.id).await.available, 100);

    let approved = env
        .ledger
        .approve_payout(&payout.id, Some("looks good"), &admin())
        .await
        .unwrap();
    assert_eq!(approved.status, PayoutStatus::Approved);
    assert_eq!(approved.processed_by.as_deref(), Some("admin-1"));
    let b = balances(&env, &profile.id).await;
    assert_eq!((b.available, b.locked), (20, 80));

    let paid = env
        .ledger
        .mark_paid(
            &payout.id,
            None,
            &admin(),
            Some("TRX-42"),
            Some("https://cdn.example.com/proof.png"),
        )
        .await
        .unwrap();
    assert_eq!(paid.status, PayoutStatus::Paid);
    assert_eq!(paid.payment_reference.as_deref(), Some("TRX-42"));

    let b = balances(&env, &profile.id).await;
    assert_eq!(
        b,
        Balances {
            pending: 0,
            available: 20,
            locked: 0,
            paid: 80,
            earnings: 100,
        }
    );
}

#[tokio::test]
async fn rejecting_an_approved_payout_restores_available() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "bob").await;
    fund_available(&env, &profile, 300).await;
    let before = balances(&env, &profile.id).await;

    let payout = env
        .ledger
        .request_payout(&env.settings, &Actor::new("bob"), 120, None)
        .await
        .unwrap();
    env.ledger
        .approve_payout(&payout.id, None, &admin())
        .await
        .unwrap();
    assert_eq!(balances(&env, &profile.id).await.locked, 120);

    let rejected = env
        .ledger
        .reject_payout(&payout.id, "account name mismatch", &admin())
        .await
        .unwrap();
    assert_eq!(rejected.status, PayoutStatus::Rejected);
    assert_eq!(rejected.admin_note.as_deref(), Some("account name mismatch"));
    assert_eq!(balances(&env, &profile.id).await, before);

    let err = env
        .ledger
        .mark_paid(&payout.id, None, &admin(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
}

#[tokio::test]
async fn rejecting_a_pending_payout_moves_no_money() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "carol").await;
    fund_available(&env, &profile, 100).await;

    let payout = env
        .ledger
        .request_payout(&env.settings, &Actor::new("carol"), 100, None)
        .await
        .unwrap();

    let err = env
        .ledger
        .reject_payout(&payout.id, "   ", &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    env.ledger
        .reject_payout(&payout.id, "duplicate request", &admin())
        .await
        .unwrap();
    let b = balances(&env, &profile.id).await;
    assert_eq!((b.available, b.locked), (100, 0));
}

#[tokio::test]
async fn only_listed_transitions_are_allowed() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "dave").await;
    fund_available(&env, &profile, 100).await;

    let payout = env
        .ledger
        .request_payout(&env.settings, &Actor::new("dave"), 60, None)
        .await
        .unwrap();

    let err = env
        .ledger
        .mark_paid(&payout.id, None, &admin(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));

    env.ledger
        .approve_payout(&payout.id, None, &admin())
        .await
        .unwrap();
    let err = env
        .ledger
        .approve_payout(&payout.id, None, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));

    let err = env
        .ledger
        .approve_payout("missing", None, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[tokio::test]
async fn concurrent_approvals_settle_exactly_once() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "erin").await;
    fund_available(&env, &profile, 200).await;

    let payout = env
        .ledger
        .request_payout(&env.settings, &Actor::new("erin"), 150, None)
        .await
        .unwrap();

    let first = Actor::new("admin-1");
    let second = Actor::new("admin-2");
    let (a, b) = tokio::join!(
        env.ledger.approve_payout(&payout.id, None, &first),
        env.ledger.approve_payout(&payout.id, None, &second),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(LedgerError::InvalidState(_))))
    );

    let b = balances(&env, &profile.id).await;
    assert_eq!((b.available, b.locked), (50, 150));
}

#[tokio::test]
async fn request_payout_guards() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "frank").await;
    let frank = Actor::new("frank");

    // Below the payout minimum of 50.
    fund_available(&env, &profile, 40).await;
    let err = env
        .ledger
        .request_payout(&env.settings, &frank, 40, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    fund_available(&env, &profile, 60).await;

    let err = env
        .ledger
        .request_payout(&env.settings, &frank, 101, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = env
        .ledger
        .request_payout(&env.settings, &frank, 0, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    env.ledger
        .request_payout(&env.settings, &frank, 70, None)
        .await
        .unwrap();
    let err = env
        .ledger
        .request_payout(&env.settings, &frank, 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)));

    let err = env
        .ledger
        .request_payout(&env.settings, &Actor::new("nobody"), 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[tokio::test]
async fn blocked_or_unapproved_affiliates_cannot_withdraw() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "gina").await;
    fund_available(&env, &profile, 100).await;

    env.ledger
        .block_affiliate("gina", true, Some("fraud review"), &admin())
        .await
        .unwrap();
    let err = env
        .ledger
        .request_payout(&env.settings, &Actor::new("gina"), 60, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));

    let unblocked = env
        .ledger
        .block_affiliate("gina", false, None, &admin())
        .await
        .unwrap();
    assert!(!unblocked.is_blocked);
    assert!(unblocked.blocked_reason.is_none());

    create_user(&env.db, "henry", "Henry").await;
    env.ledger
        .enroll(
            &Actor::new("henry"),
            enroll_input(),
            &env.settings,
            &env.encryption,
        )
        .await
        .unwrap();
    let err = env
        .ledger
        .request_payout(&env.settings, &Actor::new("henry"), 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
}

#[tokio::test]
async fn transitions_are_audited_after_commit() {
    let env = setup().await;
    let audit = Arc::new(RecordingAudit::default());
    let ledger = env.ledger.clone().with_audit(audit.clone());
    let profile = approved_affiliate(&env, "ivy").await;
    fund_available(&env, &profile, 100).await;

    let payout = ledger
        .request_payout(&env.settings, &Actor::new("ivy").with_ip("198.51.100.4"), 80, None)
        .await
        .unwrap();
    ledger
        .approve_payout(&payout.id, None, &admin())
        .await
        .unwrap();
    ledger
        .mark_paid(&payout.id, None, &admin(), Some("TRX-1"), None)
        .await
        .unwrap();

    assert_eq!(
        audit.actions(),
        vec!["payout.request", "payout.approve", "payout.paid"]
    );
    let entries = audit.entries.lock().unwrap();
    assert_eq!(entries[0].ip_address.as_deref(), Some("198.51.100.4"));
    assert_eq!(entries[1].actor_id, "admin-1");
}

#[tokio::test]
async fn failing_audit_sink_never_rolls_back_the_ledger() {
    let env = setup().await;
    let ledger = env.ledger.clone().with_audit(RecordingAudit::failing());
    let profile = approved_affiliate(&env, "jack").await;
    fund_available(&env, &profile, 100).await;

    let payout = ledger
        .request_payout(&env.settings, &Actor::new("jack"), 100, None)
        .await
        .unwrap();
    ledger
        .approve_payout(&payout.id, None, &admin())
        .await
        .unwrap();

    let b = balances(&env, &profile.id).await;
    assert_eq!((b.available, b.locked), (0, 100));
}

#[tokio::test]
async fn payout_listings_filter_by_status() {
    let env = setup().await;
    for user in ["kate", "liam"] {
        let profile = approved_affiliate(&env, user).await;
        fund_available(&env, &profile, 100).await;
        env.ledger
            .request_payout(&env.settings, &Actor::new(user), 60, None)
            .await
            .unwrap();
    }
    let liam_payout = env
        .ledger
        .list_user_payouts("liam", PageRequest::default())
        .await
        .unwrap()
        .items
        .remove(0);
    env.ledger
        .approve_payout(&liam_payout.id, None, &admin())
        .await
        .unwrap();

    let pending = env
        .ledger
        .list_payouts(
            PayoutFilter {
                status: Some(PayoutStatus::Pending),
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(pending.total, 1);
    assert_eq!(pending.items[0].payout.user_id, "kate");
    assert_eq!(
        pending.items[0].user.as_ref().map(|u| u.name.as_str()),
        Some("User kate")
    );

    let all = env
        .ledger
        .list_payouts(PayoutFilter::default(), PageRequest::new(1, 1))
        .await
        .unwrap();
    assert_eq!(all.total, 2);
    assert_eq!(all.items.len(), 1);
    assert_eq!(all.total_pages, 2);
}

#[tokio::test]
async fn approval_rechecks_available_funds() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "mona").await;
    fund_available(&env, &profile, 100).await;

    let payout = env
        .ledger
        .request_payout(&env.settings, &Actor::new("mona"), 80, None)
        .await
        .unwrap();
    env.ledger
        .adjust_balance(
            "mona",
            &admin(),
            AdjustBalanceInput {
                amount: -50,
                balance_type: "available".into(),
                reason: "chargeback".into(),
            },
        )
        .await
        .unwrap();

    let err = env
        .ledger
        .approve_payout(&payout.id, None, &admin())
        .await
        .unwrap_err();
    match err {
        LedgerError::InsufficientBalance {
            bucket,
            required,
            available,
        } => {
            assert_eq!(bucket, Bucket::Available);
            assert_eq!((required, available), (80, 50));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let b = balances(&env, &profile.id).await;
    assert_eq!((b.available, b.locked, b.earnings), (50, 0, 50));
    let stored = env
        .ledger
        .list_user_payouts("mona", PageRequest::default())
        .await
        .unwrap()
        .items
        .remove(0);
    assert_eq!(stored.status, PayoutStatus::Pending);
}

#[tokio::test]
async fn interleaved_operations_keep_every_bucket_non_negative() {
    let env = setup().await;
    let profile = approved_affiliate(&env, "nora").await;
    let nora = Actor::new("nora");
    let adjust = |amount: i64, bucket: &str| AdjustBalanceInput {
        amount,
        balance_type: bucket.into(),
        reason: "correction".into(),
    };
    let start = chrono::Utc::now().naive_utc();

    env.ledger
        .grant_commission(&profile.id, None, 120, "referral", 1)
        .await
        .unwrap();
    env.ledger
        .grant_commission(&profile.id, None, 60, "referral", 5)
        .await
        .unwrap();
    balances(&env, &profile.id).await;

    env.ledger
        .release_held_commissions_at(start + Duration::days(2))
        .await
        .unwrap();
    let first = env
        .ledger
        .request_payout(&env.settings, &nora, 100, None)
        .await
        .unwrap();
    env.ledger
        .adjust_balance("nora", &admin(), adjust(-15, "available"))
        .await
        .unwrap();
    balances(&env, &profile.id).await;

    env.ledger
        .approve_payout(&first.id, None, &admin())
        .await
        .unwrap();
    // Only 5 left in available; a bigger debit must fail cleanly.
    assert!(
        env.ledger
            .adjust_balance("nora", &admin(), adjust(-6, "available"))
            .await
            .is_err()
    );
    env.ledger
        .reject_payout(&first.id, "wrong account", &admin())
        .await
        .unwrap();
    let b = balances(&env, &profile.id).await;
    assert_eq!((b.pending, b.available, b.locked), (60, 105, 0));

    env.ledger
        .release_held_commissions_at(start + Duration::days(6))
        .await
        .unwrap();
    env.ledger
        .adjust_balance("nora", &admin(), adjust(25, "pending"))
        .await
        .unwrap();
    let second = env
        .ledger
        .request_payout(&env.settings, &nora, 165, None)
        .await
        .unwrap();
    env.ledger
        .approve_payout(&second.id, None, &admin())
        .await
        .unwrap();
    env.ledger
        .mark_paid(&second.id, None, &admin(), Some("TRX-9"), None)
        .await
        .unwrap();
    env.ledger
        .adjust_balance("nora", &admin(), adjust(-10, "paid"))
        .await
        .unwrap();

    let b = balances(&env, &profile.id).await;
    assert_eq!(
        b,
        Balances {
            pending: 25,
            available: 0,
            locked: 0,
            paid: 155,
            earnings: 180,
        }
    );
}
