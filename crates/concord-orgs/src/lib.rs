//! Organisation relationship store for the Concord platform.
//!
//! Holds the organisation registry, the gateway (node) identities each
//! organisation owns, and the partnership edge set.
//!
//! Partnership state is a directed edge set: each ordered pair of
//! organisations holds at most one edge, of kind `outgoing`, `incoming`, or
//! `friend`. Symmetry (`B ∈ friends(A) ⟺ A ∈ friends(B)`) is intended but
//! each half is stored independently — the symmetric-write helpers below
//! always mutate both halves through one call path, as two ordered,
//! independent writes with no enclosing transaction. A crash between the
//! two writes leaves a divergent pair; the helpers are written so replaying
//! the call converges the pair instead of corrupting it.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use concord_types::RelationshipState;

/// Errors that can occur during organisation store operations.
#[derive(Debug, Error)]
pub enum OrgError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("organisation not found: {0}")]
    NotFound(String),
}

/// An organisation record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organisation {
    /// Internal database ID.
    pub id: i64,
    /// Public organisation identifier.
    pub cid: String,
    /// Display name.
    pub name: String,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
}

/// Creates a new organisation. Registering an already-known `cid` is a
/// no-op so registry syncs can replay safely.
///
/// Returns `true` if the organisation was newly created.
pub fn create_organisation(conn: &Connection, cid: &str, name: &str) -> Result<bool, OrgError> {
    let inserted = conn.execute(
        "INSERT INTO organisations (cid, name) VALUES (?1, ?2)
         ON CONFLICT(cid) DO NOTHING",
        params![cid, name],
    )?;
    Ok(inserted > 0)
}

/// Retrieves an organisation by its public ID.
pub fn get_organisation(conn: &Connection, cid: &str) -> Result<Organisation, OrgError> {
    conn.query_row(
        "SELECT id, cid, name, created_at FROM organisations WHERE cid = ?1",
        [cid],
        |row| {
            Ok(Organisation {
                id: row.get(0)?,
                cid: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| OrgError::NotFound(cid.to_string()))
}

/// Registers a gateway identity under an organisation. A gateway belongs to
/// one organisation; re-registering under the same owner is a no-op.
pub fn register_node(conn: &Connection, cid: &str, agid: &str) -> Result<(), OrgError> {
    // Verify the owner exists first so the error is a NotFound rather than
    // a foreign-key failure.
    let _ = get_organisation(conn, cid)?;
    conn.execute(
        "INSERT INTO org_nodes (cid, agid) VALUES (?1, ?2)
         ON CONFLICT(agid) DO UPDATE SET cid = excluded.cid",
        params![cid, agid],
    )?;
    Ok(())
}

/// Removes a gateway identity from an organisation. Unknown gateways are a
/// silent no-op.
pub fn deregister_node(conn: &Connection, cid: &str, agid: &str) -> Result<(), OrgError> {
    conn.execute(
        "DELETE FROM org_nodes WHERE cid = ?1 AND agid = ?2",
        params![cid, agid],
    )?;
    Ok(())
}

/// Lists the gateway identities owned by an organisation.
pub fn list_nodes(conn: &Connection, cid: &str) -> Result<Vec<String>, OrgError> {
    let mut stmt = conn.prepare("SELECT agid FROM org_nodes WHERE cid = ?1 ORDER BY agid ASC")?;
    let rows = stmt.query_map([cid], |row| row.get(0))?;
    let mut nodes = Vec::new();
    for row in rows {
        nodes.push(row?);
    }
    Ok(nodes)
}

// ── Partnership edge set ─────────────────────────────────────────────

/// Returns the partnership state of the ordered pair `a`→`b`, as seen from
/// `a`'s half of the edge set.
pub fn relationship_between(
    conn: &Connection,
    a: &str,
    b: &str,
) -> Result<RelationshipState, OrgError> {
    let kind: Option<String> = conn
        .query_row(
            "SELECT kind FROM partnership_edges WHERE owner_cid = ?1 AND peer_cid = ?2",
            params![a, b],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match kind.as_deref() {
        Some("outgoing") => RelationshipState::OutgoingPending,
        Some("incoming") => RelationshipState::IncomingPending,
        Some("friend") => RelationshipState::Friends,
        _ => RelationshipState::None,
    })
}

/// Records a partnership request `from`→`to`: an `outgoing` edge at the
/// requester and the mirror `incoming` edge at the recipient. Two
/// independent upserts; replaying converges to the same state.
pub fn record_request(conn: &Connection, from: &str, to: &str) -> Result<(), OrgError> {
    upsert_edge(conn, from, to, "outgoing")?;
    upsert_edge(conn, to, from, "incoming")?;
    Ok(())
}

/// Confirms a friendship between `a` and `b`, replacing whatever pending
/// edges exist on either half. Two independent upserts.
pub fn confirm_friendship(conn: &Connection, a: &str, b: &str) -> Result<(), OrgError> {
    upsert_edge(conn, a, b, "friend")?;
    upsert_edge(conn, b, a, "friend")?;
    Ok(())
}

/// Removes a pending request between `a` and `b`, whichever direction it
/// was sent in. Friend edges are left untouched. Returns `true` if any
/// half was removed.
pub fn dissolve_request(conn: &Connection, a: &str, b: &str) -> Result<bool, OrgError> {
    let first = conn.execute(
        "DELETE FROM partnership_edges
         WHERE owner_cid = ?1 AND peer_cid = ?2 AND kind IN ('outgoing', 'incoming')",
        params![a, b],
    )?;
    let second = conn.execute(
        "DELETE FROM partnership_edges
         WHERE owner_cid = ?1 AND peer_cid = ?2 AND kind IN ('outgoing', 'incoming')",
        params![b, a],
    )?;
    Ok(first + second > 0)
}

/// Removes the friendship between `a` and `b`. Pending edges are left
/// untouched. Returns `true` if any half was removed.
pub fn dissolve_friendship(conn: &Connection, a: &str, b: &str) -> Result<bool, OrgError> {
    let first = conn.execute(
        "DELETE FROM partnership_edges
         WHERE owner_cid = ?1 AND peer_cid = ?2 AND kind = 'friend'",
        params![a, b],
    )?;
    let second = conn.execute(
        "DELETE FROM partnership_edges
         WHERE owner_cid = ?1 AND peer_cid = ?2 AND kind = 'friend'",
        params![b, a],
    )?;
    Ok(first + second > 0)
}

/// Lists the confirmed partners of an organisation.
pub fn list_friends(conn: &Connection, cid: &str) -> Result<Vec<String>, OrgError> {
    list_peers(conn, cid, "friend")
}

/// Lists the organisations this organisation has requested.
pub fn list_outgoing_requests(conn: &Connection, cid: &str) -> Result<Vec<String>, OrgError> {
    list_peers(conn, cid, "outgoing")
}

/// Lists the organisations awaiting a response from this organisation.
pub fn list_incoming_requests(conn: &Connection, cid: &str) -> Result<Vec<String>, OrgError> {
    list_peers(conn, cid, "incoming")
}

fn list_peers(conn: &Connection, cid: &str, kind: &str) -> Result<Vec<String>, OrgError> {
    let mut stmt = conn.prepare(
        "SELECT peer_cid FROM partnership_edges
         WHERE owner_cid = ?1 AND kind = ?2
         ORDER BY peer_cid ASC",
    )?;
    let rows = stmt.query_map(params![cid, kind], |row| row.get(0))?;
    let mut peers = Vec::new();
    for row in rows {
        peers.push(row?);
    }
    Ok(peers)
}

fn upsert_edge(conn: &Connection, owner: &str, peer: &str, kind: &str) -> Result<(), OrgError> {
    conn.execute(
        "INSERT INTO partnership_edges (owner_cid, peer_cid, kind) VALUES (?1, ?2, ?3)
         ON CONFLICT(owner_cid, peer_cid) DO UPDATE SET kind = excluded.kind",
        params![owner, peer, kind],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        concord_db::run_migrations(&conn).expect("migrations should succeed");
        conn
    }

    fn seed_orgs(conn: &Connection) {
        create_organisation(conn, "org-a", "Acme").expect("create org-a");
        create_organisation(conn, "org-b", "Globex").expect("create org-b");
    }

    #[test]
    fn create_organisation_is_idempotent() {
        let conn = test_db();
        assert!(create_organisation(&conn, "org-a", "Acme").expect("first create"));
        assert!(
            !create_organisation(&conn, "org-a", "Acme Renamed").expect("replay should be a no-op")
        );

        let org = get_organisation(&conn, "org-a").expect("get");
        assert_eq!(org.name, "Acme", "replay must not overwrite");
    }

    #[test]
    fn get_missing_organisation_is_not_found() {
        let conn = test_db();
        let err = get_organisation(&conn, "nope").expect_err("should fail");
        assert!(matches!(err, OrgError::NotFound(_)));
    }

    #[test]
    fn node_registration_round_trips() {
        let conn = test_db();
        seed_orgs(&conn);

        register_node(&conn, "org-a", "gw-1").expect("register");
        register_node(&conn, "org-a", "gw-2").expect("register");
        register_node(&conn, "org-a", "gw-1").expect("re-register is a no-op");

        assert_eq!(list_nodes(&conn, "org-a").expect("list"), vec!["gw-1", "gw-2"]);

        deregister_node(&conn, "org-a", "gw-1").expect("deregister");
        assert_eq!(list_nodes(&conn, "org-a").expect("list"), vec!["gw-2"]);

        // Unknown gateway removal is silent.
        deregister_node(&conn, "org-a", "gw-9").expect("no-op");
    }

    #[test]
    fn request_creates_both_halves() {
        let conn = test_db();
        seed_orgs(&conn);

        record_request(&conn, "org-a", "org-b").expect("request");

        assert_eq!(
            relationship_between(&conn, "org-a", "org-b").expect("state"),
            RelationshipState::OutgoingPending
        );
        assert_eq!(
            relationship_between(&conn, "org-b", "org-a").expect("state"),
            RelationshipState::IncomingPending
        );
        assert_eq!(
            list_incoming_requests(&conn, "org-b").expect("list"),
            vec!["org-a"]
        );
        assert_eq!(
            list_outgoing_requests(&conn, "org-a").expect("list"),
            vec!["org-b"]
        );
    }

    #[test]
    fn confirm_friendship_is_symmetric_and_clears_pending() {
        let conn = test_db();
        seed_orgs(&conn);

        record_request(&conn, "org-a", "org-b").expect("request");
        confirm_friendship(&conn, "org-b", "org-a").expect("confirm");

        assert_eq!(
            relationship_between(&conn, "org-a", "org-b").expect("state"),
            RelationshipState::Friends
        );
        assert_eq!(
            relationship_between(&conn, "org-b", "org-a").expect("state"),
            RelationshipState::Friends
        );
        assert!(list_incoming_requests(&conn, "org-b").expect("list").is_empty());
        assert!(list_outgoing_requests(&conn, "org-a").expect("list").is_empty());
    }

    #[test]
    fn dissolve_friendship_when_not_friends_is_a_no_op() {
        let conn = test_db();
        seed_orgs(&conn);

        assert!(!dissolve_friendship(&conn, "org-a", "org-b").expect("dissolve"));

        confirm_friendship(&conn, "org-a", "org-b").expect("confirm");
        assert!(dissolve_friendship(&conn, "org-a", "org-b").expect("dissolve"));
        assert_eq!(
            relationship_between(&conn, "org-a", "org-b").expect("state"),
            RelationshipState::None
        );
    }

    #[test]
    fn dissolve_request_leaves_friendships_alone() {
        let conn = test_db();
        seed_orgs(&conn);

        confirm_friendship(&conn, "org-a", "org-b").expect("confirm");
        assert!(!dissolve_request(&conn, "org-a", "org-b").expect("dissolve"));
        assert_eq!(
            relationship_between(&conn, "org-a", "org-b").expect("state"),
            RelationshipState::Friends
        );
    }

    #[test]
    fn replayed_request_converges() {
        let conn = test_db();
        seed_orgs(&conn);

        record_request(&conn, "org-a", "org-b").expect("request");
        record_request(&conn, "org-a", "org-b").expect("replay");

        assert_eq!(
            relationship_between(&conn, "org-a", "org-b").expect("state"),
            RelationshipState::OutgoingPending
        );
    }
}
