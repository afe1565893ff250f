//! Error types for the contract store.

use crate::resolve::RegistryError;

/// Errors that can occur during contract operations.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// A database operation failed.
    #[error("contract database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The referenced contract does not exist.
    #[error("contract not found: {0}")]
    NotFound(String),

    /// The operation's precondition does not hold.
    #[error("contract conflict: {0}")]
    Conflict(String),

    /// The item registry collaborator failed to resolve an item.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
