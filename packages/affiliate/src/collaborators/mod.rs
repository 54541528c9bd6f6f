//! Services the ledger consumes but does not own.

pub mod audit;
pub mod directory;
pub mod encryption;

pub use audit::{AuditEntry, AuditError, AuditSink, DbAuditLog, TracingAuditLog};
pub use directory::{DbUserDirectory, DirectoryUser, UserDirectory};
pub use encryption::{AesGcmEncryption, EncryptionService, mask_string};
