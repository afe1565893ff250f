//! Persistence operations for the notification mailbox.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MailboxError;
use concord_types::{EntityRef, EventKind, NotificationStatus};

/// A single row from the `notifications` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Auto-incremented row ID.
    pub id: i64,
    /// Public identifier of the notification (UUID v4).
    pub notification_id: String,
    /// Organisation whose inbox holds this notification.
    pub owner_cid: String,
    /// Who triggered the event.
    pub actor: EntityRef,
    /// The entity the event is about (for request kinds, the entity whose
    /// request awaits a response — this is what response lookups filter on).
    pub target: EntityRef,
    /// Secondary entity involved, when there is one.
    pub object: Option<EntityRef>,
    /// The event kind.
    pub kind: EventKind,
    /// Lifecycle status.
    pub status: NotificationStatus,
    /// Unread flag; `WAITING` notifications count as active regardless.
    pub is_unread: bool,
    /// ISO 8601 timestamp of creation.
    pub created_at: String,
}

/// Input for [`create_notification`]. `notification_id` and `created_at`
/// are assigned by the store; new notifications are always unread.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub owner_cid: String,
    pub actor: EntityRef,
    pub target: EntityRef,
    pub object: Option<EntityRef>,
    pub kind: EventKind,
    pub status: NotificationStatus,
}

/// Inserts a notification into the owner's inbox.
///
/// # Errors
///
/// Returns `MailboxError::Database` on SQL failure.
pub fn create_notification(
    conn: &Connection,
    data: &NewNotification,
) -> Result<Notification, MailboxError> {
    let notification_id = Uuid::new_v4().to_string();

    let row = conn.query_row(
        "INSERT INTO notifications
            (notification_id, owner_cid, actor_id, actor_name, target_id, target_name,
             object_id, object_name, kind, status, is_unread)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)
         RETURNING id, created_at",
        params![
            notification_id,
            data.owner_cid,
            data.actor.id,
            data.actor.name,
            data.target.id,
            data.target.name,
            data.object.as_ref().map(|o| o.id.as_str()),
            data.object.as_ref().map(|o| o.name.as_str()),
            data.kind.as_str(),
            data.status.as_str(),
        ],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    )?;

    let (id, created_at) = row;

    Ok(Notification {
        id,
        notification_id,
        owner_cid: data.owner_cid.clone(),
        actor: data.actor.clone(),
        target: data.target.clone(),
        object: data.object.clone(),
        kind: data.kind,
        status: data.status,
        is_unread: true,
        created_at,
    })
}

/// Finds the notifications that must be transitioned as a side effect of a
/// lifecycle operation: those owned by one of `owners`, in `status`, of
/// `kind`, and (when given) whose target is `target_id`.
///
/// The caller transitions each match independently — one record's failure
/// must not halt the rest.
///
/// # Errors
///
/// Returns `MailboxError::Database` on SQL failure.
pub fn find_active_notifications(
    conn: &Connection,
    owners: &[String],
    status: NotificationStatus,
    kind: EventKind,
    target_id: Option<&str>,
) -> Result<Vec<Notification>, MailboxError> {
    if owners.is_empty() {
        return Ok(Vec::new());
    }

    // Build a parameterised query dynamically. WHERE clauses and bind
    // parameters are collected separately so nothing is interpolated.
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    let owner_marks: Vec<String> = owners
        .iter()
        .map(|owner| {
            param_values.push(Box::new(owner.clone()));
            let mark = format!("?{idx}");
            idx += 1;
            mark
        })
        .collect();

    let mut clauses = vec![format!("owner_cid IN ({})", owner_marks.join(", "))];

    clauses.push(format!("status = ?{idx}"));
    param_values.push(Box::new(status.as_str().to_string()));
    idx += 1;

    clauses.push(format!("kind = ?{idx}"));
    param_values.push(Box::new(kind.as_str().to_string()));
    idx += 1;

    if let Some(target) = target_id {
        clauses.push(format!("target_id = ?{idx}"));
        param_values.push(Box::new(target.to_string()));
    }

    let sql = format!(
        "SELECT id, notification_id, owner_cid, actor_id, actor_name, target_id, target_name,
                object_id, object_name, kind, status, is_unread, created_at
         FROM notifications
         WHERE {}
         ORDER BY created_at ASC, id ASC",
        clauses.join(" AND ")
    );

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), map_row_to_notification)?;

    let mut notifications = Vec::new();
    for row in rows {
        notifications.push(row?);
    }

    Ok(notifications)
}

/// Returns an inbox page for `owners`, newest first.
///
/// With `unread_only`, a notification counts as unread when its flag is set
/// *or* it is still `WAITING` — a pending request stays visible even after
/// it has been opened.
///
/// # Errors
///
/// Returns `MailboxError::Database` on SQL failure.
pub fn get_notifications(
    conn: &Connection,
    owners: &[String],
    unread_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Notification>, MailboxError> {
    if owners.is_empty() {
        return Ok(Vec::new());
    }

    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    let owner_marks: Vec<String> = owners
        .iter()
        .map(|owner| {
            param_values.push(Box::new(owner.clone()));
            let mark = format!("?{idx}");
            idx += 1;
            mark
        })
        .collect();

    let mut clauses = vec![format!("owner_cid IN ({})", owner_marks.join(", "))];
    if unread_only {
        clauses.push("(is_unread = 1 OR status = 'WAITING')".to_string());
    }

    let sql = format!(
        "SELECT id, notification_id, owner_cid, actor_id, actor_name, target_id, target_name,
                object_id, object_name, kind, status, is_unread, created_at
         FROM notifications
         WHERE {}
         ORDER BY created_at DESC, id DESC
         LIMIT ?{idx} OFFSET ?{}",
        clauses.join(" AND "),
        idx + 1
    );

    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), map_row_to_notification)?;

    let mut notifications = Vec::new();
    for row in rows {
        notifications.push(row?);
    }

    Ok(notifications)
}

/// Sets or clears the unread flag.
///
/// # Errors
///
/// Returns `MailboxError::NotFound` if no such notification exists.
pub fn set_read(conn: &Connection, notification_id: &str, read: bool) -> Result<(), MailboxError> {
    let changed = conn.execute(
        "UPDATE notifications SET is_unread = ?2 WHERE notification_id = ?1",
        params![notification_id, !read],
    )?;
    if changed == 0 {
        return Err(MailboxError::NotFound(notification_id.to_string()));
    }
    Ok(())
}

/// Moves a notification to `status`.
///
/// The transition guard lives in the UPDATE predicate: a `RESPONDED`
/// notification never reverts to `WAITING`, and a transition to the status
/// already held is a harmless no-op. A blocked revert is also a no-op
/// rather than an error, so concurrent responders can replay safely.
///
/// # Errors
///
/// Returns `MailboxError::NotFound` if no such notification exists.
pub fn set_status(
    conn: &Connection,
    notification_id: &str,
    status: NotificationStatus,
) -> Result<(), MailboxError> {
    let changed = conn.execute(
        "UPDATE notifications SET status = ?2
         WHERE notification_id = ?1
           AND NOT (status = 'RESPONDED' AND ?2 = 'WAITING')",
        params![notification_id, status.as_str()],
    )?;
    if changed == 0 {
        ensure_exists(conn, notification_id)?;
    }
    Ok(())
}

/// Responds to a `WAITING` notification: moves it to `RESPONDED` and marks
/// it read in one statement. Responding to a notification that has already
/// left `WAITING` is a no-op.
///
/// # Errors
///
/// Returns `MailboxError::NotFound` if no such notification exists.
pub fn respond(conn: &Connection, notification_id: &str) -> Result<(), MailboxError> {
    let changed = conn.execute(
        "UPDATE notifications SET status = 'RESPONDED', is_unread = 0
         WHERE notification_id = ?1 AND status = 'WAITING'",
        params![notification_id],
    )?;
    if changed == 0 {
        ensure_exists(conn, notification_id)?;
    }
    Ok(())
}

fn ensure_exists(conn: &Connection, notification_id: &str) -> Result<(), MailboxError> {
    conn.query_row(
        "SELECT 1 FROM notifications WHERE notification_id = ?1",
        params![notification_id],
        |_| Ok(()),
    )
    .optional()?
    .ok_or_else(|| MailboxError::NotFound(notification_id.to_string()))
}

fn map_row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let kind_str: String = row.get(9)?;
    let kind: EventKind = kind_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status_str: String = row.get(10)?;
    let status = NotificationStatus::from_str_label(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown notification status: {status_str}").into(),
        )
    })?;

    let object_id: Option<String> = row.get(7)?;
    let object_name: Option<String> = row.get(8)?;
    let object = match (object_id, object_name) {
        (Some(id), Some(name)) => Some(EntityRef { id, name }),
        _ => None,
    };

    Ok(Notification {
        id: row.get(0)?,
        notification_id: row.get(1)?,
        owner_cid: row.get(2)?,
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
        status,
        is_unread: row.get(11)?,
        created_at: row.get(12)?,
    })
}
