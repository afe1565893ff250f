//! Error types for the relationship coordinator.
//!
//! Two-tier policy: the variants here are the *primary* errors that abort a
//! lifecycle operation and reach the caller. Peripheral failures (audit
//! writes, notification response-transitions, external sinks) are caught at
//! their call site and logged, never surfaced through this type.

use concord_audit::AuditError;
use concord_contracts::{ContractError, RegistryError};
use concord_mailbox::MailboxError;
use concord_orgs::OrgError;

/// Errors returned by coordinator lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// A referenced organisation does not exist.
    #[error("organisation not found: {0}")]
    OrgNotFound(String),

    /// A referenced contract does not exist.
    #[error("contract not found: {0}")]
    ContractNotFound(String),

    /// A referenced notification does not exist.
    #[error("notification not found: {0}")]
    NotificationNotFound(String),

    /// The operation's precondition does not hold and its outcome is not
    /// already in place.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Checking out a pooled connection failed.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The item registry collaborator failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The blocking task running the primary mutation panicked or was
    /// cancelled.
    #[error("blocking task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<OrgError> for CoordinatorError {
    fn from(e: OrgError) -> Self {
        match e {
            OrgError::NotFound(id) => Self::OrgNotFound(id),
            OrgError::Database(e) => Self::Database(e),
        }
    }
}

impl From<ContractError> for CoordinatorError {
    fn from(e: ContractError) -> Self {
        match e {
            ContractError::NotFound(id) => Self::ContractNotFound(id),
            ContractError::Conflict(msg) => Self::Conflict(msg),
            ContractError::Database(e) => Self::Database(e),
            ContractError::Registry(e) => Self::Registry(e),
        }
    }
}

impl From<MailboxError> for CoordinatorError {
    fn from(e: MailboxError) -> Self {
        match e {
            MailboxError::NotFound(id) => Self::NotificationNotFound(id),
            MailboxError::Database(e) => Self::Database(e),
        }
    }
}

impl From<AuditError> for CoordinatorError {
    fn from(e: AuditError) -> Self {
        match e {
            AuditError::Database(e) => Self::Database(e),
        }
    }
}
