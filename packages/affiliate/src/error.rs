use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::ledger::Bucket;

/// Every ledger operation fails with one of these kinds.
///
/// Infrastructure failures (`Database`, `Encryption`) leave balances untouched:
/// the surrounding transaction is dropped before commit and rolled back.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("insufficient {bucket} balance: need {required}, have {available}")]
    InsufficientBalance {
        bucket: Bucket,
        required: i64,
        available: i64,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("encryption error: {0}")]
    Encryption(String),
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        let id = id.into();
        tracing::warn!("Not found: {} {}", entity, id);
        Self::NotFound { entity, id }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Invalid state: {}", msg);
        Self::InvalidState(msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Validation failed: {}", msg);
        Self::Validation(msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Conflict: {}", msg);
        Self::Conflict(msg)
    }

    /// Maps a unique-key violation on insert to `Conflict`.
    pub fn from_insert(err: sea_orm::DbErr, conflict: impl Into<String>) -> Self {
        match err.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => Self::conflict(conflict),
            _ => Self::Database(err),
        }
    }

    /// Stable machine-readable code used in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Encryption(_) => "ENCRYPTION_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidState(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Encryption(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Encryption(_))
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorEnvelope<'a> {
            error: ErrorBody<'a>,
        }

        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: &'a str,
            message: String,
        }

        // Internal details stay in the logs.
        let message = if self.is_internal() {
            tracing::error!("Internal ledger error: {:?}", self);
            self.status()
                .canonical_reason()
                .unwrap_or("Error")
                .to_string()
        } else {
            self.to_string()
        };

        (
            self.status(),
            Json(ErrorEnvelope {
                error: ErrorBody {
                    code: self.code(),
                    message,
                },
            }),
        )
            .into_response()
    }
}
