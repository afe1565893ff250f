//! Persistence operations for the contract store.
//!
//! Every mutation runs inside a savepoint spanning the contract's own
//! tables and re-derives the contract status before committing, so the
//! invariant `Approved ⟺ members non-empty ∧ nothing pending` holds after
//! any single mutation regardless of interleaving.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::ContractError;
use crate::types::{Contract, ItemGrant, NewContract};
use concord_types::{ContractStatus, ContractType};

/// Creates a new contract with the creator as first confirmed member and
/// the invitees pending.
pub fn create_contract(
    conn: &mut Connection,
    params_in: &NewContract,
) -> Result<Contract, ContractError> {
    let ctid = Uuid::new_v4().to_string();

    let sp = conn.savepoint()?;

    // Status is inserted as PENDING and immediately re-derived; a contract
    // created without invitees is approved from the start.
    sp.execute(
        "INSERT INTO contracts (ctid, contract_type, status, description)
         VALUES (?1, ?2, 'PENDING', ?3)",
        params![
            ctid,
            params_in.contract_type.as_str(),
            params_in.description,
        ],
    )?;

    sp.execute(
        "INSERT INTO contract_members (ctid, cid, state, position) VALUES (?1, ?2, 'member', 0)",
        params![ctid, params_in.creator_cid],
    )?;

    for (offset, cid) in params_in.invited_cids.iter().enumerate() {
        sp.execute(
            "INSERT INTO contract_members (ctid, cid, state, position)
             VALUES (?1, ?2, 'pending', ?3)
             ON CONFLICT(ctid, cid) DO NOTHING",
            params![ctid, cid, (offset + 1) as i64],
        )?;
    }

    for (offset, item) in params_in.items.iter().enumerate() {
        insert_item(&sp, &ctid, item, offset as i64)?;
    }

    derive_status(&sp, &ctid)?;
    sp.commit()?;

    get_contract(conn, &ctid)
}

/// Retrieves a contract with its membership, removal history, and grants.
pub fn get_contract(conn: &Connection, ctid: &str) -> Result<Contract, ContractError> {
    let header = conn
        .query_row(
            "SELECT id, ctid, contract_type, status, description, created_at, updated_at
             FROM contracts WHERE ctid = ?1",
            [ctid],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| ContractError::NotFound(ctid.to_string()))?;

    let (id, ctid_out, type_str, status_str, description, created_at, updated_at) = header;

    let contract_type = ContractType::from_str_label(&type_str)
        .ok_or_else(|| ContractError::Conflict(format!("unknown contract type: {type_str}")))?;
    let status = ContractStatus::from_str_label(&status_str)
        .ok_or_else(|| ContractError::Conflict(format!("unknown contract status: {status_str}")))?;

    Ok(Contract {
        id,
        ctid: ctid_out,
        contract_type,
        status,
        description,
        organisations: member_cids(conn, ctid, "member")?,
        pending_organisations: member_cids(conn, ctid, "pending")?,
        removed_organisations: removed_cids(conn, ctid)?,
        items: item_grants(conn, ctid)?,
        created_at,
        updated_at,
    })
}

/// Lists the non-deleted contracts an organisation is confirmed or pending
/// in, oldest first.
pub fn list_contracts_for_org(
    conn: &Connection,
    cid: &str,
) -> Result<Vec<Contract>, ContractError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT c.ctid
         FROM contracts c
         JOIN contract_members m ON m.ctid = c.ctid
         WHERE m.cid = ?1 AND c.status != 'DELETED'
         ORDER BY c.created_at ASC, c.id ASC",
    )?;
    let ctids: Vec<String> = stmt
        .query_map([cid], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut contracts = Vec::new();
    for ctid in ctids {
        contracts.push(get_contract(conn, &ctid)?);
    }
    Ok(contracts)
}

/// Invites an organisation into an existing contract. An approved contract
/// drops back to pending until the invitee responds. Re-inviting an
/// already-pending organisation is a no-op; inviting a confirmed member is
/// a conflict.
///
/// Returns `true` if the invitation changed the contract.
pub fn add_pending_organisation(
    conn: &mut Connection,
    ctid: &str,
    cid: &str,
) -> Result<bool, ContractError> {
    ensure_mutable(conn, ctid)?;

    match member_state(conn, ctid, cid)? {
        Some(state) if state == "member" => {
            return Err(ContractError::Conflict(format!(
                "{cid} is already a member of {ctid}"
            )))
        }
        Some(_) => return Ok(false),
        None => {}
    }

    let sp = conn.savepoint()?;
    sp.execute(
        "INSERT INTO contract_members (ctid, cid, state, position)
         VALUES (?1, ?2, 'pending',
                 (SELECT COALESCE(MAX(position), -1) + 1 FROM contract_members WHERE ctid = ?1))",
        params![ctid, cid],
    )?;
    derive_status(&sp, ctid)?;
    touch(&sp, ctid)?;
    sp.commit()?;
    Ok(true)
}

/// Confirms a pending organisation as a member. Accepting twice is a
/// no-op; accepting without an invitation is a conflict.
///
/// Returns `true` if the acceptance changed the contract.
pub fn accept_membership(
    conn: &mut Connection,
    ctid: &str,
    cid: &str,
) -> Result<bool, ContractError> {
    ensure_mutable(conn, ctid)?;

    match member_state(conn, ctid, cid)? {
        Some(state) if state == "member" => return Ok(false),
        Some(_) => {}
        None => {
            return Err(ContractError::Conflict(format!(
                "{cid} has no pending invitation in {ctid}"
            )))
        }
    }

    let sp = conn.savepoint()?;
    sp.execute(
        "UPDATE contract_members SET state = 'member'
         WHERE ctid = ?1 AND cid = ?2 AND state = 'pending'",
        params![ctid, cid],
    )?;
    derive_status(&sp, ctid)?;
    touch(&sp, ctid)?;
    sp.commit()?;
    Ok(true)
}

/// Drops a pending invitation. Declining an invitation that does not exist
/// is a no-op.
///
/// Returns `true` if a pending entry was removed.
pub fn decline_membership(
    conn: &mut Connection,
    ctid: &str,
    cid: &str,
) -> Result<bool, ContractError> {
    ensure_mutable(conn, ctid)?;

    let sp = conn.savepoint()?;
    let removed = sp.execute(
        "DELETE FROM contract_members WHERE ctid = ?1 AND cid = ?2 AND state = 'pending'",
        params![ctid, cid],
    )?;
    derive_status(&sp, ctid)?;
    touch(&sp, ctid)?;
    sp.commit()?;
    Ok(removed > 0)
}

/// Withdraws a confirmed member: removes it from the member set, strips
/// every item grant it owns, and appends it to the removal history — one
/// savepoint, so the contract never shows a removed member with live
/// grants. Withdrawing a non-member is a no-op.
///
/// Returns `true` if the organisation was a member.
pub fn remove_organisation_from_contract(
    conn: &mut Connection,
    ctid: &str,
    cid: &str,
) -> Result<bool, ContractError> {
    ensure_mutable(conn, ctid)?;

    let sp = conn.savepoint()?;
    let removed = sp.execute(
        "DELETE FROM contract_members WHERE ctid = ?1 AND cid = ?2 AND state = 'member'",
        params![ctid, cid],
    )?;
    if removed > 0 {
        sp.execute(
            "DELETE FROM contract_items WHERE ctid = ?1 AND cid = ?2",
            params![ctid, cid],
        )?;
        sp.execute(
            "INSERT INTO contract_removed (ctid, cid, position)
             VALUES (?1, ?2,
                     (SELECT COALESCE(MAX(position), -1) + 1 FROM contract_removed WHERE ctid = ?1))
             ON CONFLICT(ctid, cid) DO NOTHING",
            params![ctid, cid],
        )?;
        derive_status(&sp, ctid)?;
        touch(&sp, ctid)?;
    }
    sp.commit()?;
    Ok(removed > 0)
}

/// Adds or replaces the grant for an item. At most one grant per `oid`
/// within a contract: re-granting the same item overwrites the previous
/// grant in place.
pub fn upsert_item_grant(
    conn: &mut Connection,
    ctid: &str,
    item: &ItemGrant,
) -> Result<(), ContractError> {
    ensure_mutable(conn, ctid)?;

    let sp = conn.savepoint()?;
    sp.execute(
        "INSERT INTO contract_items (ctid, oid, cid, uid, user_mail, item_type, rw, enabled, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                 (SELECT COALESCE(MAX(position), -1) + 1 FROM contract_items WHERE ctid = ?1))
         ON CONFLICT(ctid, oid) DO UPDATE SET
             cid = excluded.cid,
             uid = excluded.uid,
             user_mail = excluded.user_mail,
             item_type = excluded.item_type,
             rw = excluded.rw,
             enabled = excluded.enabled",
        params![
            ctid,
            item.oid,
            item.cid,
            item.uid,
            item.user_mail,
            item.item_type,
            item.rw,
            item.enabled,
        ],
    )?;
    touch(&sp, ctid)?;
    sp.commit()?;
    Ok(())
}

/// Enables or disables an existing grant without touching its other fields.
pub fn set_item_enabled(
    conn: &mut Connection,
    ctid: &str,
    oid: &str,
    enabled: bool,
) -> Result<(), ContractError> {
    ensure_mutable(conn, ctid)?;

    let sp = conn.savepoint()?;
    let changed = sp.execute(
        "UPDATE contract_items SET enabled = ?3 WHERE ctid = ?1 AND oid = ?2",
        params![ctid, oid, enabled],
    )?;
    if changed == 0 {
        return Err(ContractError::NotFound(format!("grant {oid} in {ctid}")));
    }
    touch(&sp, ctid)?;
    sp.commit()?;
    Ok(())
}

/// Removes the grant for an item. Removing an absent grant is a no-op.
///
/// Returns `true` if a grant was removed.
pub fn remove_item_grant(
    conn: &mut Connection,
    ctid: &str,
    oid: &str,
) -> Result<bool, ContractError> {
    ensure_mutable(conn, ctid)?;

    let sp = conn.savepoint()?;
    let removed = sp.execute(
        "DELETE FROM contract_items WHERE ctid = ?1 AND oid = ?2",
        params![ctid, oid],
    )?;
    if removed > 0 {
        touch(&sp, ctid)?;
    }
    sp.commit()?;
    Ok(removed > 0)
}

/// Soft-deletes a contract: terminal status, membership and grants
/// cleared, header and removal history preserved for auditability.
/// Deleting twice is a no-op.
///
/// Returns `true` if the contract was live before the call.
pub fn delete_contract(conn: &mut Connection, ctid: &str) -> Result<bool, ContractError> {
    if fetch_status(conn, ctid)? == ContractStatus::Deleted {
        return Ok(false);
    }

    let sp = conn.savepoint()?;
    sp.execute(
        "UPDATE contracts SET status = 'DELETED', updated_at = datetime('now') WHERE ctid = ?1",
        params![ctid],
    )?;
    sp.execute("DELETE FROM contract_members WHERE ctid = ?1", params![ctid])?;
    sp.execute("DELETE FROM contract_items WHERE ctid = ?1", params![ctid])?;
    sp.commit()?;
    Ok(true)
}

// ── Internal helpers ─────────────────────────────────────────────────

/// Re-derives the contract status from membership. `Deleted` is terminal
/// and never overwritten; otherwise the status is `Approved` exactly when
/// at least one organisation is confirmed and none is pending.
fn derive_status(conn: &Connection, ctid: &str) -> Result<(), ContractError> {
    conn.execute(
        "UPDATE contracts SET status =
            CASE
              WHEN status = 'DELETED' THEN 'DELETED'
              WHEN (SELECT COUNT(*) FROM contract_members WHERE ctid = ?1 AND state = 'member') > 0
               AND (SELECT COUNT(*) FROM contract_members WHERE ctid = ?1 AND state = 'pending') = 0
                THEN 'APPROVED'
              ELSE 'PENDING'
            END
         WHERE ctid = ?1",
        params![ctid],
    )?;
    Ok(())
}

fn touch(conn: &Connection, ctid: &str) -> Result<(), ContractError> {
    conn.execute(
        "UPDATE contracts SET updated_at = datetime('now') WHERE ctid = ?1",
        params![ctid],
    )?;
    Ok(())
}

fn fetch_status(conn: &Connection, ctid: &str) -> Result<ContractStatus, ContractError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM contracts WHERE ctid = ?1",
            [ctid],
            |row| row.get(0),
        )
        .optional()?;
    let status = status.ok_or_else(|| ContractError::NotFound(ctid.to_string()))?;
    ContractStatus::from_str_label(&status)
        .ok_or_else(|| ContractError::Conflict(format!("unknown contract status: {status}")))
}

fn ensure_mutable(conn: &Connection, ctid: &str) -> Result<(), ContractError> {
    if fetch_status(conn, ctid)? == ContractStatus::Deleted {
        return Err(ContractError::Conflict(format!(
            "contract {ctid} is deleted"
        )));
    }
    Ok(())
}

fn member_state(
    conn: &Connection,
    ctid: &str,
    cid: &str,
) -> Result<Option<String>, ContractError> {
    Ok(conn
        .query_row(
            "SELECT state FROM contract_members WHERE ctid = ?1 AND cid = ?2",
            params![ctid, cid],
            |row| row.get(0),
        )
        .optional()?)
}

fn member_cids(conn: &Connection, ctid: &str, state: &str) -> Result<Vec<String>, ContractError> {
    let mut stmt = conn.prepare(
        "SELECT cid FROM contract_members WHERE ctid = ?1 AND state = ?2 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![ctid, state], |row| row.get(0))?;
    let mut cids = Vec::new();
    for row in rows {
        cids.push(row?);
    }
    Ok(cids)
}

fn removed_cids(conn: &Connection, ctid: &str) -> Result<Vec<String>, ContractError> {
    let mut stmt =
        conn.prepare("SELECT cid FROM contract_removed WHERE ctid = ?1 ORDER BY position ASC")?;
    let rows = stmt.query_map([ctid], |row| row.get(0))?;
    let mut cids = Vec::new();
    for row in rows {
        cids.push(row?);
    }
    Ok(cids)
}

fn item_grants(conn: &Connection, ctid: &str) -> Result<Vec<ItemGrant>, ContractError> {
    let mut stmt = conn.prepare(
        "SELECT oid, cid, uid, user_mail, item_type, rw, enabled
         FROM contract_items WHERE ctid = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map([ctid], |row| {
        Ok(ItemGrant {
            oid: row.get(0)?,
            cid: row.get(1)?,
            uid: row.get(2)?,
            user_mail: row.get(3)?,
            item_type: row.get(4)?,
            rw: row.get(5)?,
            enabled: row.get(6)?,
        })
    })?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

fn insert_item(
    conn: &Connection,
    ctid: &str,
    item: &ItemGrant,
    position: i64,
) -> Result<(), ContractError> {
    conn.execute(
        "INSERT INTO contract_items (ctid, oid, cid, uid, user_mail, item_type, rw, enabled, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(ctid, oid) DO UPDATE SET
             cid = excluded.cid,
             uid = excluded.uid,
             user_mail = excluded.user_mail,
             item_type = excluded.item_type,
             rw = excluded.rw,
             enabled = excluded.enabled",
        params![
            ctid,
            item.oid,
            item.cid,
            item.uid,
            item.user_mail,
            item.item_type,
            item.rw,
            item.enabled,
            position,
        ],
    )?;
    Ok(())
}
