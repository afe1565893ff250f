//! Error types for the notification mailbox.

/// Errors that can occur during mailbox operations.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// A database operation failed.
    #[error("mailbox database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The referenced notification does not exist.
    #[error("notification not found: {0}")]
    NotFound(String),
}
