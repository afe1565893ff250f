//! Contract store for the Concord platform.
//!
//! A contract is a shared-access agreement between organisations: a set of
//! confirmed members, a set of organisations still pending acceptance, a
//! removal history, and a list of individually enabled/disabled item
//! grants. The store also exposes the authorization-resolution query a
//! gateway uses to learn which items it may expose, and the
//! private-contract classification of an organisation pair.
//!
//! A contract and its child rows form one "document": every mutation runs
//! inside a savepoint over the contract's own tables, and the contract
//! status is re-derived from membership before the savepoint commits
//! (`Approved` iff members non-empty and nothing pending). Nothing here
//! spans two contracts, or a contract and an organisation, atomically.

mod error;
mod resolve;
mod store;
mod types;

pub use error::ContractError;
pub use resolve::{
    common_contract_status, resolve_items_for_gateway, ItemRegistry, RegistryError,
    StaticItemRegistry,
};
pub use store::{
    accept_membership, add_pending_organisation, create_contract, decline_membership,
    delete_contract, get_contract, list_contracts_for_org, remove_item_grant,
    remove_organisation_from_contract, set_item_enabled, upsert_item_grant,
};
pub use types::{Contract, GatewayGrant, ItemGrant, NewContract};

#[cfg(test)]
mod tests;
