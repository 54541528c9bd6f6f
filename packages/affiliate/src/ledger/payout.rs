//! Payout request state machine.
//!
//! Every admin transition locks the request row, checks
//! [`PayoutStatus::can_transition_to`], moves the funds and then updates the
//! status with `WHERE status = <from>`. When two admins act on the same request
//! the second one finds the status changed and gets `InvalidState`.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, prelude::Expr,
};
use serde_json::json;

use super::{
    Actor, Ledger, UnitOfWork,
    balance::{BalanceDelta, Bucket},
    new_id,
};
use crate::entity::{
    payout_request,
    sea_orm_active_enums::{AffiliateStatus, PayoutStatus},
};
use crate::error::{LedgerError, Result};
use crate::settings::AffiliateSettings;

/// Admin-supplied fields written with a transition.
#[derive(Default)]
struct Resolution<'a> {
    admin_note: Option<&'a str>,
    payment_reference: Option<&'a str>,
    proof_url: Option<&'a str>,
}

fn ensure_transition(payout: &payout_request::Model, next: PayoutStatus) -> Result<()> {
    if payout.status.can_transition_to(next) {
        return Ok(());
    }
    Err(LedgerError::invalid_state(format!(
        "payout request {} is {:?} and cannot become {:?}",
        payout.id, payout.status, next
    )))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Ledger {
    /// Files a withdrawal request for the acting user. No balance moves until an
    /// admin approves it.
    #[tracing::instrument(name = "ledger::request_payout", skip(self, settings, note))]
    pub async fn request_payout(
        &self,
        settings: &AffiliateSettings,
        user: &Actor,
        amount: i64,
        note: Option<&str>,
    ) -> Result<payout_request::Model> {
        if amount <= 0 {
            return Err(LedgerError::validation(
                "payout amount must be greater than zero",
            ));
        }

        let uow = UnitOfWork::begin(&self.db).await?;
        let profile = uow.lock_profile_by_user(&user.id).await?;

        if profile.status != AffiliateStatus::Approved {
            return Err(LedgerError::invalid_state("affiliate profile is not approved"));
        }
        if profile.is_blocked {
            return Err(LedgerError::invalid_state("affiliate account is blocked"));
        }
        if amount > profile.available_balance {
            return Err(LedgerError::validation(format!(
                "amount {} exceeds available balance {}",
                amount, profile.available_balance
            )));
        }
        if profile.available_balance < settings.payout_minimum {
            return Err(LedgerError::validation(format!(
                "minimum payout amount of {} not reached",
                settings.payout_minimum
            )));
        }

        let active = payout_request::Entity::find()
            .filter(payout_request::Column::UserId.eq(user.id.as_str()))
            .filter(payout_request::Column::Status.is_in(PayoutStatus::active()))
            .count(uow.txn())
            .await?;
        if active > 0 {
            return Err(LedgerError::conflict(
                "an active payout request already exists",
            ));
        }

        let now = uow.now();
        let payout = payout_request::ActiveModel {
            id: Set(new_id()),
            user_id: Set(user.id.clone()),
            affiliate_id: Set(profile.id.clone()),
            amount: Set(amount),
            status: Set(PayoutStatus::Pending),
            note: Set(non_blank(note).map(str::to_string)),
            admin_note: Set(None),
            payment_reference: Set(None),
            proof_url: Set(None),
            requested_at: Set(now),
            processed_at: Set(None),
            processed_by: Set(None),
            created_at: Set(now),
        }
        .insert(uow.txn())
        .await?;
        uow.commit().await?;

        tracing::info!(
            "User {} requested payout {} of {}",
            user.id,
            payout.id,
            amount
        );
        self.audit(
            user.audit_entry("payout.request", "payout_request", payout.id.clone())
                .json(json!({ "amount": amount })),
        )
        .await;

        Ok(payout)
    }

    /// PENDING → APPROVED. Reserves the amount: available → locked.
    #[tracing::instrument(name = "ledger::approve_payout", skip(self, note))]
    pub async fn approve_payout(
        &self,
        payout_id: &str,
        note: Option<&str>,
        admin: &Actor,
    ) -> Result<payout_request::Model> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let payout = uow.lock_payout(payout_id).await?;
        ensure_transition(&payout, PayoutStatus::Approved)?;

        uow.apply(
            &payout.affiliate_id,
            &BalanceDelta::transfer(Bucket::Available, Bucket::Locked, payout.amount),
        )
        .await?;

        let payout = set_status(
            &uow,
            &payout,
            PayoutStatus::Approved,
            admin,
            Resolution {
                admin_note: non_blank(note),
                ..Default::default()
            },
        )
        .await?;
        uow.commit().await?;

        tracing::info!("Payout {} approved by {}", payout.id, admin.id);
        self.audit(
            admin
                .audit_entry("payout.approve", "payout_request", payout.id.clone())
                .json(json!({ "amount": payout.amount })),
        )
        .await;

        Ok(payout)
    }

    /// PENDING or APPROVED → REJECTED. A reservation made on approval is
    /// returned to available.
    #[tracing::instrument(name = "ledger::reject_payout", skip(self, note))]
    pub async fn reject_payout(
        &self,
        payout_id: &str,
        note: &str,
        admin: &Actor,
    ) -> Result<payout_request::Model> {
        let Some(note) = non_blank(Some(note)) else {
            return Err(LedgerError::validation("a rejection note is required"));
        };

        let uow = UnitOfWork::begin(&self.db).await?;
        let payout = uow.lock_payout(payout_id).await?;
        ensure_transition(&payout, PayoutStatus::Rejected)?;

        if payout.status == PayoutStatus::Approved {
            uow.apply(
                &payout.affiliate_id,
                &BalanceDelta::transfer(Bucket::Locked, Bucket::Available, payout.amount),
            )
            .await?;
        }

        let payout = set_status(
            &uow,
            &payout,
            PayoutStatus::Rejected,
            admin,
            Resolution {
                admin_note: Some(note),
                ..Default::default()
            },
        )
        .await?;
        uow.commit().await?;

        tracing::info!("Payout {} rejected by {}", payout.id, admin.id);
        self.audit(
            admin
                .audit_entry("payout.reject", "payout_request", payout.id.clone())
                .json(json!({ "amount": payout.amount, "note": note })),
        )
        .await;

        Ok(payout)
    }

    /// APPROVED → PAID. Settles the reservation: locked → paid.
    #[tracing::instrument(name = "ledger::mark_paid", skip(self, note, proof_url))]
    pub async fn mark_paid(
        &self,
        payout_id: &str,
        note: Option<&str>,
        admin: &Actor,
        payment_reference: Option<&str>,
        proof_url: Option<&str>,
    ) -> Result<payout_request::Model> {
        let uow = UnitOfWork::begin(&self.db).await?;
        let payout = uow.lock_payout(payout_id).await?;
        ensure_transition(&payout, PayoutStatus::Paid)?;

        uow.apply(
            &payout.affiliate_id,
            &BalanceDelta::transfer(Bucket::Locked, Bucket::Paid, payout.amount),
        )
        .await?;

        let payout = set_status(
            &uow,
            &payout,
            PayoutStatus::Paid,
            admin,
            Resolution {
                admin_note: non_blank(note),
                payment_reference: non_blank(payment_reference),
                proof_url: non_blank(proof_url),
            },
        )
        .await?;
        uow.commit().await?;

        tracing::info!("Payout {} marked paid by {}", payout.id, admin.id);
        self.audit(
            admin
                .audit_entry("payout.paid", "payout_request", payout.id.clone())
                .json(json!({
                    "amount": payout.amount,
                    "payment_reference": payout.payment_reference,
                })),
        )
        .await;

        Ok(payout)
    }
}

async fn set_status(
    uow: &UnitOfWork,
    payout: &payout_request::Model,
    next: PayoutStatus,
    admin: &Actor,
    resolution: Resolution<'_>,
) -> Result<payout_request::Model> {
    let mut update = payout_request::Entity::update_many()
        .col_expr(payout_request::Column::Status, Expr::value(next))
        .col_expr(payout_request::Column::ProcessedAt, Expr::value(uow.now()))
        .col_expr(
            payout_request::Column::ProcessedBy,
            Expr::value(admin.id.clone()),
        )
        .filter(payout_request::Column::Id.eq(payout.id.as_str()))
        .filter(payout_request::Column::Status.eq(payout.status));

    if let Some(note) = resolution.admin_note {
        update = update.col_expr(payout_request::Column::AdminNote, Expr::value(note));
    }
    if let Some(reference) = resolution.payment_reference {
        update = update.col_expr(
            payout_request::Column::PaymentReference,
            Expr::value(reference),
        );
    }
    if let Some(url) = resolution.proof_url {
        update = update.col_expr(payout_request::Column::ProofUrl, Expr::value(url));
    }

    let result = update.exec(uow.txn()).await?;
    if result.rows_affected != 1 {
        return Err(LedgerError::invalid_state(format!(
            "payout request {} changed while being processed",
            payout.id
        )));
    }

    payout_request::Entity::find_by_id(payout.id.clone())
        .one(uow.txn())
        .await?
        .ok_or_else(|| LedgerError::not_found("payout request", payout.id.as_str()))
}
