//! Authorization resolution and private-contract pair classification.

use std::collections::HashMap;

use rusqlite::{params, Connection};

use crate::error::ContractError;
use crate::types::GatewayGrant;
use concord_types::CommonContractStatus;

/// Error reported by an item registry implementation.
#[derive(Debug, thiserror::Error)]
#[error("item registry error: {0}")]
pub struct RegistryError(pub String);

/// The external item registry: maps a shared item to the gateway that
/// hosts it and the organisation that owns it. `None` means the registry
/// does not know the item (it may have been deleted since the grant was
/// written).
pub trait ItemRegistry: Send + Sync {
    fn resolve_owning_gateway(&self, oid: &str) -> Result<Option<String>, RegistryError>;
    fn resolve_owning_org(&self, oid: &str) -> Result<Option<String>, RegistryError>;
}

/// A fixed in-memory registry, for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct StaticItemRegistry {
    /// oid → (owning agid, owning cid)
    entries: HashMap<String, (String, String)>,
}

impl StaticItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an item as hosted on `agid` and owned by `cid`.
    pub fn insert(&mut self, oid: &str, agid: &str, cid: &str) {
        self.entries
            .insert(oid.to_string(), (agid.to_string(), cid.to_string()));
    }
}

impl ItemRegistry for StaticItemRegistry {
    fn resolve_owning_gateway(&self, oid: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.entries.get(oid).map(|(agid, _)| agid.clone()))
    }

    fn resolve_owning_org(&self, oid: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.entries.get(oid).map(|(_, cid)| cid.clone()))
    }
}

/// Resolves the items a gateway may expose under a contract: exactly the
/// grants with `enabled = true` whose owning item the registry maps to
/// `agid`. Deterministic; grants whose item the registry no longer knows
/// are skipped.
///
/// This is a join between the contract's grant list and the registry; the
/// grant list is read through the `(ctid, position)` index so repeated
/// calls see a stable order.
pub fn resolve_items_for_gateway(
    conn: &Connection,
    registry: &dyn ItemRegistry,
    ctid: &str,
    agid: &str,
) -> Result<Vec<GatewayGrant>, ContractError> {
    // Existence check keeps a bad ctid a NotFound rather than an empty set.
    let _ = crate::store::get_contract(conn, ctid)?;

    let mut stmt = conn.prepare(
        "SELECT oid, rw FROM contract_items
         WHERE ctid = ?1 AND enabled = 1
         ORDER BY position ASC",
    )?;
    let rows = stmt.query_map([ctid], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
    })?;

    let mut grants = Vec::new();
    for row in rows {
        let (oid, rw) = row?;
        match registry.resolve_owning_gateway(&oid)? {
            Some(owner) if owner == agid => grants.push(GatewayGrant { oid, rw }),
            _ => {}
        }
    }

    Ok(grants)
}

/// Classifies an ordered organisation pair with respect to private
/// contracts: `contracted` when a non-deleted private contract confirms
/// both, `contract_requested` when one includes both with at least one of
/// them still pending. The pair `(cid, cid)` classifies as neither.
pub fn common_contract_status(
    conn: &Connection,
    cid_a: &str,
    cid_b: &str,
) -> Result<CommonContractStatus, ContractError> {
    if cid_a == cid_b {
        return Ok(CommonContractStatus::default());
    }

    let mut stmt = conn.prepare(
        "SELECT ma.state, mb.state
         FROM contracts c
         JOIN contract_members ma ON ma.ctid = c.ctid AND ma.cid = ?1
         JOIN contract_members mb ON mb.ctid = c.ctid AND mb.cid = ?2
         WHERE c.contract_type = 'PRIVATE' AND c.status != 'DELETED'",
    )?;
    let rows = stmt.query_map(params![cid_a, cid_b], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut status = CommonContractStatus::default();
    for row in rows {
        let (state_a, state_b) = row?;
        if state_a == "member" && state_b == "member" {
            status.contracted = true;
        } else {
            status.contract_requested = true;
        }
    }

    Ok(status)
}
