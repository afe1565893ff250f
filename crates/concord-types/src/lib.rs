//! Shared types, identifiers, and the event-kind taxonomy for Concord.
//!
//! This crate provides the foundational types used across all Concord crates:
//! the event-kind taxonomy shared by notifications and audit records, the
//! partnership/contract/notification status enums, and the `{id, name}`
//! entity reference carried by every notification and audit record.
//!
//! No crate in the workspace depends on anything *except* `concord-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.
//!
//! Identifier conventions (all opaque strings, assigned by their owning
//! store or by the caller): `cid` — organisation, `ctid` — contract,
//! `oid` — shareable item, `agid` — gateway/node, `uid` — user.

use serde::{Deserialize, Serialize};

mod event;

pub use event::{EventDomain, EventKind, ParseEventDomainError, ParseEventKindError};

/// A `{id, name}` reference to an entity involved in a notification or
/// audit record. The `name` is denormalized at creation time so the record
/// stays readable after the entity itself is renamed or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Lifecycle status of a notification.
///
/// Request-kind notifications start `Waiting` and move to `Responded`
/// exactly once. Informational notifications are created directly in one of
/// the terminal statuses (`Info`, `Accepted`, `Rejected`) and never
/// transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    /// Awaiting a response from the owning organisation.
    Waiting,
    /// Informational, no response expected.
    Info,
    /// Created to report an accepted request.
    Accepted,
    /// Created to report a rejected request.
    Rejected,
    /// A former `Waiting` notification that has been responded to. Terminal.
    Responded,
}

impl NotificationStatus {
    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Info => "INFO",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Responded => "RESPONDED",
        }
    }

    /// Attempts to parse a canonical status label.
    pub fn from_str_label(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(Self::Waiting),
            "INFO" => Some(Self::Info),
            "ACCEPTED" => Some(Self::Accepted),
            "REJECTED" => Some(Self::Rejected),
            "RESPONDED" => Some(Self::Responded),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract agreement types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractType {
    /// Bilateral or small-circle agreement; feeds partner classification.
    Private,
    /// Open agreement visible to the wider community.
    Community,
}

impl ContractType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "PRIVATE",
            Self::Community => "COMMUNITY",
        }
    }

    pub fn from_str_label(s: &str) -> Option<Self> {
        match s {
            "PRIVATE" => Some(Self::Private),
            "COMMUNITY" => Some(Self::Community),
            _ => None,
        }
    }
}

/// Contract lifecycle status.
///
/// Always derived from membership after a mutation: `Approved` iff the
/// confirmed member set is non-empty and no organisation is pending.
/// `Deleted` is terminal and soft — the record persists for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Pending,
    Approved,
    Deleted,
}

impl ContractStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Deleted => "DELETED",
        }
    }

    pub fn from_str_label(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Partnership state of an ordered organisation pair A→B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipState {
    /// No request and no friendship in either direction.
    None,
    /// A has requested B and awaits a response.
    OutgoingPending,
    /// B has requested A; A may accept or reject.
    IncomingPending,
    /// A and B are confirmed partners.
    Friends,
}

/// Classification of an organisation pair with respect to private contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonContractStatus {
    /// A non-deleted private contract confirms both organisations.
    pub contracted: bool,
    /// A private contract includes both with at least one side pending.
    pub contract_requested: bool,
}

/// Compliance labels attached to every audit record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLabels {
    /// Outcome label, e.g. "SUCCEEDED" or "FAILED".
    pub status: String,
    /// Subsystem that produced the record, e.g. "coordinator".
    pub source: String,
    /// Where the triggering request originated, e.g. "api" or "system".
    pub origin: String,
    /// Client address, when one was available.
    pub ip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_status_labels_round_trip() {
        for status in [
            NotificationStatus::Waiting,
            NotificationStatus::Info,
            NotificationStatus::Accepted,
            NotificationStatus::Rejected,
            NotificationStatus::Responded,
        ] {
            assert_eq!(
                NotificationStatus::from_str_label(status.as_str()),
                Some(status)
            );
        }
        assert_eq!(NotificationStatus::from_str_label("BOGUS"), None);
    }

    #[test]
    fn contract_status_labels_round_trip() {
        for status in [
            ContractStatus::Pending,
            ContractStatus::Approved,
            ContractStatus::Deleted,
        ] {
            assert_eq!(ContractStatus::from_str_label(status.as_str()), Some(status));
        }
    }
}
