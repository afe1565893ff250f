//! Unit tests for the audit trail.

use rusqlite::Connection;

use crate::store::{create_audit, get_audits, NewAudit};
use concord_types::{AuditLabels, EntityRef, EventKind};

/// Creates an in-memory SQLite database with migrations applied.
fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    concord_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

fn labels() -> AuditLabels {
    AuditLabels {
        status: "SUCCEEDED".to_string(),
        source: "coordinator".to_string(),
        origin: "api".to_string(),
        ip: None,
    }
}

fn new_audit(cid: &str, target_id: &str, kind: EventKind) -> NewAudit {
    NewAudit {
        cid: cid.to_string(),
        actor: EntityRef::new("org-a", "Acme"),
        target: EntityRef::new(target_id, "Globex"),
        object: None,
        kind,
        labels: labels(),
    }
}

#[test]
fn create_audit_assigns_id_and_message() {
    let conn = test_db();

    let record = create_audit(
        &conn,
        &new_audit("org-a", "org-b", EventKind::PartnershipAccepted),
    )
    .expect("create should succeed");

    assert!(record.id > 0);
    assert!(!record.audit_id.is_empty());
    assert_eq!(
        record.message,
        "Acme accepted the partnership request from Globex"
    );
    assert!(!record.created_at.is_empty());
}

#[test]
fn get_audits_filters_by_cid_and_target() {
    let conn = test_db();

    create_audit(
        &conn,
        &new_audit("org-a", "org-b", EventKind::PartnershipAccepted),
    )
    .expect("create should succeed");
    create_audit(
        &conn,
        &new_audit("org-a", "org-c", EventKind::PartnershipDissolved),
    )
    .expect("create should succeed");
    create_audit(
        &conn,
        &new_audit("org-x", "org-b", EventKind::PartnershipAccepted),
    )
    .expect("create should succeed");

    let records = get_audits(&conn, "org-a", "org-b", 7).expect("query should succeed");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].cid, "org-a");
    assert_eq!(records[0].target.id, "org-b");
}

#[test]
fn get_audits_excludes_records_older_than_window() {
    let conn = test_db();

    let record = create_audit(
        &conn,
        &new_audit("org-a", "org-b", EventKind::PartnershipAccepted),
    )
    .expect("create should succeed");

    // Age the record beyond any window by rewriting its timestamp directly.
    conn.execute(
        "UPDATE audit_records SET created_at = datetime('now', '-30 days') WHERE id = ?1",
        [record.id],
    )
    .expect("should age record");

    let recent = get_audits(&conn, "org-a", "org-b", 7).expect("query should succeed");
    assert!(recent.is_empty(), "aged record should fall outside window");

    let wide = get_audits(&conn, "org-a", "org-b", 60).expect("query should succeed");
    assert_eq!(wide.len(), 1, "wider window should include the record");
}

#[test]
fn get_audits_returns_newest_first() {
    let conn = test_db();

    let first = create_audit(
        &conn,
        &new_audit("org-a", "org-b", EventKind::PartnershipRequested),
    )
    .expect("create should succeed");
    let second = create_audit(
        &conn,
        &new_audit("org-a", "org-b", EventKind::PartnershipAccepted),
    )
    .expect("create should succeed");

    let records = get_audits(&conn, "org-a", "org-b", 7).expect("query should succeed");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].audit_id, second.audit_id);
    assert_eq!(records[1].audit_id, first.audit_id);
}

#[test]
fn object_round_trips_through_storage() {
    let conn = test_db();

    let mut data = new_audit("org-a", "ct-1", EventKind::ContractItemAdded);
    data.object = Some(EntityRef::new("item-9", "dataset-9"));

    create_audit(&conn, &data).expect("create should succeed");

    let records = get_audits(&conn, "org-a", "ct-1", 7).expect("query should succeed");
    assert_eq!(records.len(), 1);
    let object = records[0].object.as_ref().expect("object should be stored");
    assert_eq!(object.id, "item-9");
    assert_eq!(records[0].message, "Acme added dataset-9 to the contract Globex");
}
