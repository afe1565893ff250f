//! Event domains and the shared event-kind taxonomy.
//!
//! Notifications and audit records draw their `kind` from the same enum so
//! the two trails stay comparable: a `PARTNERSHIP_ACCEPTED` notification in
//! an inbox and a `PARTNERSHIP_ACCEPTED` audit record describe the same
//! transition.

use serde::{Deserialize, Serialize};

/// Event domains, grouping related event kinds for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventDomain {
    /// Shareable item lifecycle outside any contract.
    Item,
    /// User membership and roles within an organisation.
    User,
    /// Gateway (node) registration and ownership.
    Node,
    /// Organisation registry changes.
    Company,
    /// Partnership request/accept/reject/cancel lifecycle.
    Partnership,
    /// Contract membership and item-grant lifecycle.
    Contract,
}

impl EventDomain {
    /// Returns the canonical string label for this domain.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Item => "ITEM",
            Self::User => "USER",
            Self::Node => "NODE",
            Self::Company => "COMPANY",
            Self::Partnership => "PARTNERSHIP",
            Self::Contract => "CONTRACT",
        }
    }
}

impl std::fmt::Display for EventDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventDomain {
    type Err = ParseEventDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ITEM" => Ok(Self::Item),
            "USER" => Ok(Self::User),
            "NODE" => Ok(Self::Node),
            "COMPANY" => Ok(Self::Company),
            "PARTNERSHIP" => Ok(Self::Partnership),
            "CONTRACT" => Ok(Self::Contract),
            _ => Err(ParseEventDomainError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown event domain string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown event domain: {0}")]
pub struct ParseEventDomainError(pub String);

/// The event kinds carried by notifications and audit records.
///
/// Stored as their canonical SCREAMING_SNAKE_CASE label in the `kind`
/// column of both tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    // ── Partnership domain ───────────────────────────────────────────
    /// A partnership request arrived; awaits a response from the owner.
    PartnershipRequested,
    /// Confirmation to the requester that its request went out.
    PartnershipRequestSent,
    /// A partnership request was accepted.
    PartnershipAccepted,
    /// A partnership request was rejected.
    PartnershipRejected,
    /// The requester withdrew a pending request.
    PartnershipRequestCancelled,
    /// An established partnership was dissolved.
    PartnershipDissolved,

    // ── Contract domain ──────────────────────────────────────────────
    /// A contract proposal arrived; awaits a response from the owner.
    ContractProposed,
    /// Confirmation to the proposer that its proposal went out.
    ContractProposalSent,
    /// An organisation accepted a contract and became a member.
    ContractJoined,
    /// An organisation declined a contract proposal.
    ContractDeclined,
    /// An organisation was invited into an existing contract.
    ContractInvited,
    /// A member organisation withdrew from a contract.
    ContractLeft,
    /// A contract was dissolved.
    ContractDissolved,
    /// Contract metadata changed.
    ContractUpdated,
    /// An item grant was added to a contract.
    ContractItemAdded,
    /// An item grant was removed from a contract.
    ContractItemRemoved,
    /// An existing item grant was enabled.
    ContractItemEnabled,
    /// An existing item grant was disabled.
    ContractItemDisabled,

    // ── Item domain ──────────────────────────────────────────────────
    ItemShared,
    ItemUnshared,
    ItemUpdated,

    // ── User domain ──────────────────────────────────────────────────
    UserInvited,
    UserRemoved,
    UserRoleChanged,

    // ── Node domain ──────────────────────────────────────────────────
    /// A gateway was registered under an organisation.
    NodeRegistered,
    /// A gateway was removed from an organisation.
    NodeDeregistered,
    NodeUpdated,

    // ── Company domain ───────────────────────────────────────────────
    CompanyRegistered,
    CompanyUpdated,
    CompanyDeleted,
}

impl EventKind {
    /// Returns the canonical string label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PartnershipRequested => "PARTNERSHIP_REQUESTED",
            Self::PartnershipRequestSent => "PARTNERSHIP_REQUEST_SENT",
            Self::PartnershipAccepted => "PARTNERSHIP_ACCEPTED",
            Self::PartnershipRejected => "PARTNERSHIP_REJECTED",
            Self::PartnershipRequestCancelled => "PARTNERSHIP_REQUEST_CANCELLED",
            Self::PartnershipDissolved => "PARTNERSHIP_DISSOLVED",
            Self::ContractProposed => "CONTRACT_PROPOSED",
            Self::ContractProposalSent => "CONTRACT_PROPOSAL_SENT",
            Self::ContractJoined => "CONTRACT_JOINED",
            Self::ContractDeclined => "CONTRACT_DECLINED",
            Self::ContractInvited => "CONTRACT_INVITED",
            Self::ContractLeft => "CONTRACT_LEFT",
            Self::ContractDissolved => "CONTRACT_DISSOLVED",
            Self::ContractUpdated => "CONTRACT_UPDATED",
            Self::ContractItemAdded => "CONTRACT_ITEM_ADDED",
            Self::ContractItemRemoved => "CONTRACT_ITEM_REMOVED",
            Self::ContractItemEnabled => "CONTRACT_ITEM_ENABLED",
            Self::ContractItemDisabled => "CONTRACT_ITEM_DISABLED",
            Self::ItemShared => "ITEM_SHARED",
            Self::ItemUnshared => "ITEM_UNSHARED",
            Self::ItemUpdated => "ITEM_UPDATED",
            Self::UserInvited => "USER_INVITED",
            Self::UserRemoved => "USER_REMOVED",
            Self::UserRoleChanged => "USER_ROLE_CHANGED",
            Self::NodeRegistered => "NODE_REGISTERED",
            Self::NodeDeregistered => "NODE_DEREGISTERED",
            Self::NodeUpdated => "NODE_UPDATED",
            Self::CompanyRegistered => "COMPANY_REGISTERED",
            Self::CompanyUpdated => "COMPANY_UPDATED",
            Self::CompanyDeleted => "COMPANY_DELETED",
        }
    }

    /// Returns the domain this kind belongs to.
    pub fn domain(self) -> EventDomain {
        match self {
            Self::PartnershipRequested
            | Self::PartnershipRequestSent
            | Self::PartnershipAccepted
            | Self::PartnershipRejected
            | Self::PartnershipRequestCancelled
            | Self::PartnershipDissolved => EventDomain::Partnership,
            Self::ContractProposed
            | Self::ContractProposalSent
            | Self::ContractJoined
            | Self::ContractDeclined
            | Self::ContractInvited
            | Self::ContractLeft
            | Self::ContractDissolved
            | Self::ContractUpdated
            | Self::ContractItemAdded
            | Self::ContractItemRemoved
            | Self::ContractItemEnabled
            | Self::ContractItemDisabled => EventDomain::Contract,
            Self::ItemShared | Self::ItemUnshared | Self::ItemUpdated => EventDomain::Item,
            Self::UserInvited | Self::UserRemoved | Self::UserRoleChanged => EventDomain::User,
            Self::NodeRegistered | Self::NodeDeregistered | Self::NodeUpdated => EventDomain::Node,
            Self::CompanyRegistered | Self::CompanyUpdated | Self::CompanyDeleted => {
                EventDomain::Company
            }
        }
    }

    /// All known kinds, in declaration order.
    pub fn all() -> &'static [EventKind] {
        &[
            Self::PartnershipRequested,
            Self::PartnershipRequestSent,
            Self::PartnershipAccepted,
            Self::PartnershipRejected,
            Self::PartnershipRequestCancelled,
            Self::PartnershipDissolved,
            Self::ContractProposed,
            Self::ContractProposalSent,
            Self::ContractJoined,
            Self::ContractDeclined,
            Self::ContractInvited,
            Self::ContractLeft,
            Self::ContractDissolved,
            Self::ContractUpdated,
            Self::ContractItemAdded,
            Self::ContractItemRemoved,
            Self::ContractItemEnabled,
            Self::ContractItemDisabled,
            Self::ItemShared,
            Self::ItemUnshared,
            Self::ItemUpdated,
            Self::UserInvited,
            Self::UserRemoved,
            Self::UserRoleChanged,
            Self::NodeRegistered,
            Self::NodeDeregistered,
            Self::NodeUpdated,
            Self::CompanyRegistered,
            Self::CompanyUpdated,
            Self::CompanyDeleted,
        ]
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEventKindError(s.to_string()))
    }
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct ParseEventKindError(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn every_kind_round_trips_through_its_label() {
        for kind in EventKind::all() {
            let parsed = EventKind::from_str(kind.as_str()).expect("label should parse");
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        assert!(EventKind::from_str("NOT_A_KIND").is_err());
    }

    #[test]
    fn kinds_cover_all_six_domains() {
        use std::collections::HashSet;
        let domains: HashSet<&str> = EventKind::all()
            .iter()
            .map(|k| k.domain().as_str())
            .collect();
        assert_eq!(domains.len(), 6);
    }
}
