//! Creates the ledger tables from the entity definitions.
//!
//! Production databases are migrated separately; this is for local setups and
//! tests.

use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema, sea_query::Index};

use crate::entity::{
    commission, payout_request,
    prelude::{
        AffiliateProfile, AffiliateSettings, AuditLog, BalanceAdjustment, Commission,
        PayoutRequest, ReferralEvent, User,
    },
    referral_event,
};

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Creates every table in dependency order, then the lookup indexes.
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    create_table(db, &schema, User).await?;
    create_table(db, &schema, AffiliateSettings).await?;
    create_table(db, &schema, AffiliateProfile).await?;
    create_table(db, &schema, ReferralEvent).await?;
    create_table(db, &schema, Commission).await?;
    create_table(db, &schema, PayoutRequest).await?;
    create_table(db, &schema, BalanceAdjustment).await?;
    create_table(db, &schema, AuditLog).await?;

    let indexes = [
        Index::create()
            .name("idx_affiliate_commissions_release")
            .table(Commission)
            .col(commission::Column::Status)
            .col(commission::Column::HoldUntil)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_payout_requests_user_status")
            .table(PayoutRequest)
            .col(payout_request::Column::UserId)
            .col(payout_request::Column::Status)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_referral_events_ip_created")
            .table(ReferralEvent)
            .col(referral_event::Column::IpAddress)
            .col(referral_event::Column::CreatedAt)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_referral_events_referrer")
            .table(ReferralEvent)
            .col(referral_event::Column::ReferrerId)
            .if_not_exists()
            .to_owned(),
    ];
    for index in indexes {
        db.execute(backend.build(&index)).await?;
    }

    tracing::info!("Affiliate ledger schema ready");
    Ok(())
}
