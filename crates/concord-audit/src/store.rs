//! Persistence operations for the audit trail.
//!
//! All writes go through [`create_audit`], which derives the message text,
//! assigns a fresh `audit_id`, and inserts into the `audit_records` table in
//! a single statement. There is no update or delete path.

use chrono::{Days, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;
use crate::message::render_message;
use concord_types::{AuditLabels, EntityRef, EventKind};

/// A single row from the `audit_records` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Auto-incremented row ID.
    pub id: i64,
    /// Public identifier of the record (UUID v4).
    pub audit_id: String,
    /// Organisation on whose trail this record appears.
    pub cid: String,
    /// Who performed the action.
    pub actor: EntityRef,
    /// Who or what the action was directed at.
    pub target: EntityRef,
    /// Secondary entity involved, when there is one.
    pub object: Option<EntityRef>,
    /// The event kind.
    pub kind: EventKind,
    /// Derived human-readable sentence.
    pub message: String,
    /// Compliance labels.
    pub labels: AuditLabels,
    /// ISO 8601 timestamp of creation.
    pub created_at: String,
}

/// Input for [`create_audit`]. `audit_id`, `message`, and `created_at` are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAudit {
    pub cid: String,
    pub actor: EntityRef,
    pub target: EntityRef,
    pub object: Option<EntityRef>,
    pub kind: EventKind,
    pub labels: AuditLabels,
}

/// Appends a record to the audit trail.
///
/// The message is derived via [`render_message`] from the kind and the
/// denormalized entity names, so the record stays readable after the
/// entities themselves change or disappear.
///
/// # Errors
///
/// Returns `AuditError::Database` on SQL failure.
pub fn create_audit(conn: &Connection, data: &NewAudit) -> Result<AuditRecord, AuditError> {
    let audit_id = Uuid::new_v4().to_string();
    let message = render_message(
        data.kind,
        &data.actor.name,
        &data.target.name,
        data.object.as_ref().map(|o| o.name.as_str()),
    );

    let row = conn.query_row(
        "INSERT INTO audit_records
            (audit_id, cid, actor_id, actor_name, target_id, target_name,
             object_id, object_name, kind, message,
             label_status, label_source, label_origin, label_ip)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         RETURNING id, created_at",
        params![
            audit_id,
            data.cid,
            data.actor.id,
            data.actor.name,
            data.target.id,
            data.target.name,
            data.object.as_ref().map(|o| o.id.as_str()),
            data.object.as_ref().map(|o| o.name.as_str()),
            data.kind.as_str(),
            message,
            data.labels.status,
            data.labels.source,
            data.labels.origin,
            data.labels.ip,
        ],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    )?;

    let (id, created_at) = row;

    Ok(AuditRecord {
        id,
        audit_id,
        cid: data.cid.clone(),
        actor: data.actor.clone(),
        target: data.target.clone(),
        object: data.object.clone(),
        kind: data.kind,
        message,
        labels: data.labels.clone(),
        created_at,
    })
}

/// Returns the audit records for `cid` targeting `target_id` created within
/// the last `days` days, newest first.
///
/// The window starts at midnight UTC `days` days ago, so a query for one day
/// covers yesterday's whole day plus today so far.
///
/// # Errors
///
/// Returns `AuditError::Database` on SQL failure.
pub fn get_audits(
    conn: &Connection,
    cid: &str,
    target_id: &str,
    days: u64,
) -> Result<Vec<AuditRecord>, AuditError> {
    let midnight = Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(days))
        .unwrap_or_default()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    let cutoff = midnight.format("%Y-%m-%d %H:%M:%S").to_string();

    let mut stmt = conn.prepare(
        "SELECT id, audit_id, cid, actor_id, actor_name, target_id, target_name,
                object_id, object_name, kind, message,
                label_status, label_source, label_origin, label_ip, created_at
         FROM audit_records
         WHERE cid = ?1 AND target_id = ?2 AND created_at >= ?3
         ORDER BY created_at DESC, id DESC",
    )?;

    let rows = stmt.query_map(params![cid, target_id, cutoff], map_row_to_record)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }

    Ok(records)
}

fn map_row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    let kind_str: String = row.get(9)?;
    let kind: EventKind = kind_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let object_id: Option<String> = row.get(7)?;
    let object_name: Option<String> = row.get(8)?;
    let object = match (object_id, object_name) {
        (Some(id), Some(name)) => Some(EntityRef { id, name }),
        _ => None,
    };

    Ok(AuditRecord {
        id: row.get(0)?,
        audit_id: row.get(1)?,
        cid: row.get(2)?,
        actor: EntityRef {
            id: row.get(3)?,
            name: row.get(4)?,
        },
        target: EntityRef {
            id: row.get(5)?,
            name: row.get(6)?,
        },
        object,
        kind,
        message: row.get(10)?,
        labels: concord_types::AuditLabels {
            status: row.get(11)?,
            source: row.get(12)?,
            origin: row.get(13)?,
            ip: row.get(14)?,
        },
        created_at: row.get(15)?,
    })
}
