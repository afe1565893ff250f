//! Contract record types.

use serde::{Deserialize, Serialize};

use concord_types::{ContractStatus, ContractType};

/// A fully assembled contract: header row plus membership, removal history,
/// and item grants, in their stored order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contract {
    /// Internal database ID.
    pub id: i64,
    /// Public contract identifier (UUID v4).
    pub ctid: String,
    pub contract_type: ContractType,
    pub status: ContractStatus,
    pub description: String,
    /// Confirmed members, in invitation order.
    pub organisations: Vec<String>,
    /// Organisations invited but not yet accepted, in invitation order.
    pub pending_organisations: Vec<String>,
    /// Organisations that were once members, in removal order. History;
    /// survives soft deletion.
    pub removed_organisations: Vec<String>,
    /// Item grants, in insertion order.
    pub items: Vec<ItemGrant>,
    pub created_at: String,
    pub updated_at: String,
}

/// An individual item grant within a contract. At most one grant per `oid`
/// within the same contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemGrant {
    /// The shared item.
    pub oid: String,
    /// The organisation that owns the item.
    pub cid: String,
    /// The user who shared the item.
    pub uid: String,
    pub user_mail: String,
    /// Free-form item type label, e.g. "dataset".
    pub item_type: String,
    /// Read-write access when `true`, read-only otherwise.
    pub rw: bool,
    /// Disabled grants stay on the contract but never resolve.
    pub enabled: bool,
}

/// Input for [`crate::create_contract`].
#[derive(Debug, Clone)]
pub struct NewContract {
    pub contract_type: ContractType,
    pub description: String,
    /// The proposing organisation; becomes the first confirmed member.
    pub creator_cid: String,
    /// Organisations invited at creation time; start pending.
    pub invited_cids: Vec<String>,
    /// Initial item grants offered by the creator.
    pub items: Vec<ItemGrant>,
}

/// One entry of the authorization-resolution result: an item a gateway may
/// expose, with its access mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayGrant {
    pub oid: String,
    pub rw: bool,
}
