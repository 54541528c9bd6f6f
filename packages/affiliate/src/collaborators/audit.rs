//! Write-once audit trail.
//!
//! Entries are recorded after the ledger transaction has committed. A failing
//! sink is logged and never undoes the ledger change.

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

use crate::entity::audit_log;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuditEntry {
    pub actor_id: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub details: Option<String>,
    pub ip_address: Option<String>,
}

impl AuditEntry {
    pub fn new(
        actor_id: impl Into<String>,
        action: impl Into<String>,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            action: action.into(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            details: None,
            ip_address: None,
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn json(self, details: serde_json::Value) -> Self {
        self.details(details.to_string())
    }

    pub fn ip_address(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Appends to the `audit_logs` table.
#[derive(Clone, Debug)]
pub struct DbAuditLog {
    db: DatabaseConnection,
}

impl DbAuditLog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for DbAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        audit_log::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            user_id: Set(entry.actor_id),
            action: Set(entry.action),
            entity: Set(entry.entity),
            entity_id: Set(entry.entity_id),
            details: Set(entry.details),
            ip_address: Set(entry.ip_address),
            created_at: Set(chrono::Utc::now().naive_utc()),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}

/// Records into the log stream only.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditSink for TracingAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        tracing::info!(
            actor = %entry.actor_id,
            action = %entry.action,
            entity = %entry.entity,
            entity_id = %entry.entity_id,
            details = entry.details.as_deref().unwrap_or_default(),
            "audit"
        );
        Ok(())
    }
}

/// Writes `entry` to `sink`, logging instead of failing.
pub async fn record_best_effort(sink: &dyn AuditSink, entry: AuditEntry) {
    let action = entry.action.clone();
    let entity_id = entry.entity_id.clone();
    if let Err(e) = sink.record(entry).await {
        tracing::warn!(
            "Failed to write audit entry {} for {}: {}",
            action,
            entity_id,
            e
        );
    }
}
