//! The affiliate ledger: sole owner of the balance buckets.
//!
//! Every balance mutation runs inside a [`UnitOfWork`] and goes through
//! [`UnitOfWork::apply`], which rejects any delta that would drive a bucket
//! below zero. Audit entries are written after commit.

mod accrual;
mod adjustment;
mod balance;
mod payout;
mod profile;
mod queries;
mod release;
mod unit_of_work;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::collaborators::{
    AuditEntry, AuditSink, DbAuditLog, DbUserDirectory, UserDirectory, audit::record_best_effort,
};

pub use adjustment::AdjustBalanceInput;
pub use balance::{BalanceDelta, Balances, Bucket};
pub use profile::{EnrollInput, PayoutDetails};
pub use queries::{
    AdminStats, Page, PageRequest, PayoutFilter, PayoutListItem, ProfileFilter, ProfileListItem,
    TopAffiliate, UserStats,
};
pub use unit_of_work::UnitOfWork;

/// Actor id recorded for unattended operations such as the release job.
pub const SYSTEM_ACTOR: &str = "system";

/// Who is performing an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub ip: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ip: None,
        }
    }

    pub fn system() -> Self {
        Self::new(SYSTEM_ACTOR)
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn audit_entry(
        &self,
        action: &str,
        entity: &str,
        entity_id: impl Into<String>,
    ) -> AuditEntry {
        AuditEntry::new(self.id.clone(), action, entity, entity_id).ip_address(self.ip.clone())
    }
}

#[derive(Clone)]
pub struct Ledger {
    db: DatabaseConnection,
    audit: Arc<dyn AuditSink>,
    directory: Arc<dyn UserDirectory>,
}

impl Ledger {
    /// Ledger with the table-backed audit log and user directory.
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            audit: Arc::new(DbAuditLog::new(db.clone())),
            directory: Arc::new(DbUserDirectory::new(db.clone())),
            db,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn audit(&self, entry: AuditEntry) {
        record_best_effort(self.audit.as_ref(), entry).await;
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
