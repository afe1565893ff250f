//! Notification mailbox for the Concord platform.
//!
//! Each organisation owns an inbox of asynchronous cross-organisation
//! events. Request-kind notifications (partnership requests, contract
//! proposals) are created `WAITING` and move to `RESPONDED` exactly once
//! when the owning organisation reacts; informational notifications are
//! created directly in a terminal status and never transition again.
//!
//! Status transitions are expressed in the UPDATE predicate rather than as
//! read-modify-write, so concurrent responders can race without ever
//! reverting a `RESPONDED` notification to `WAITING`.

mod error;
mod store;

pub use error::MailboxError;
pub use store::{
    create_notification, find_active_notifications, get_notifications, respond, set_read,
    set_status, NewNotification, Notification,
};
