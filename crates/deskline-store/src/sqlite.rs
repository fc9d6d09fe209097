//! SQLite-based store implementation

use chrono::{DateTime, Local};
use deskline_api::Notification;
use deskline_util::{NotificationId, TicketId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Tickets
            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                category TEXT,
                assignee TEXT,
                requester_kind TEXT NOT NULL,
                requester_id INTEGER NOT NULL,
                source TEXT NOT NULL,
                tags_json TEXT NOT NULL DEFAULT '[]',
                sla_policy TEXT NOT NULL,
                response_due_at TEXT NOT NULL,
                resolution_due_at TEXT NOT NULL,
                first_response_at TEXT,
                resolved_at TEXT,
                closed_at TEXT,
                escalation_level INTEGER NOT NULL DEFAULT 0,
                reopen_count INTEGER NOT NULL DEFAULT 0,
                breach_notified INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ticket_replies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id INTEGER NOT NULL,
                author TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Menus
            CREATE TABLE IF NOT EXISTS menus (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                location TEXT
            );

            CREATE TABLE IF NOT EXISTS menu_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                menu_id INTEGER NOT NULL,
                parent_id INTEGER,
                label TEXT NOT NULL,
                url TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0
            );

            -- Media folders
            CREATE TABLE IF NOT EXISTS media_folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                parent_id INTEGER
            );

            -- Pages and templates
            CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                template_id INTEGER,
                parent_id INTEGER,
                meta_title TEXT,
                meta_description TEXT
            );

            -- Redirects
            CREATE TABLE IF NOT EXISTS redirects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL UNIQUE,
                target TEXT NOT NULL,
                status_code INTEGER NOT NULL DEFAULT 301,
                active INTEGER NOT NULL DEFAULT 1,
                hits INTEGER NOT NULL DEFAULT 0,
                last_hit_at TEXT
            );

            -- Notification outbox
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id INTEGER,
                target TEXT NOT NULL,
                recipient TEXT,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                delivered_at TEXT
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_replies_ticket ON ticket_replies(ticket_id);
            CREATE INDEX IF NOT EXISTS idx_menu_items_parent ON menu_items(menu_id, parent_id, sort_order);
            CREATE INDEX IF NOT EXISTS idx_folders_parent ON media_folders(parent_id);
            CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id);
            CREATE INDEX IF NOT EXISTS idx_pages_template ON pages(template_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_pending ON notifications(delivered_at, attempts);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

// Column helpers shared by the table modules

pub(crate) fn time_to_sql(dt: &DateTime<Local>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn opt_time_to_sql(dt: &Option<DateTime<Local>>) -> Option<String> {
    dt.as_ref().map(time_to_sql)
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let s: String = row.get(idx)?;
    parse_timestamp(idx, &s)
}

pub(crate) fn get_opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Local>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_timestamp(idx, &s)).transpose()
}

/// Read a text column through `FromStr`
pub(crate) fn get_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: NotificationId::new(row.get(0)?),
        ticket_id: row.get::<_, Option<i64>>(1)?.map(TicketId::new),
        target: get_parsed(row, 2)?,
        recipient: row.get(3)?,
        message: row.get(4)?,
        created_at: get_time(row, 5)?,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        delivered_at: get_opt_time(row, 8)?,
    })
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![time_to_sql(&event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp = get_time(row, 1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, event_json) = row?;
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn enqueue_notification(&self, notification: &Notification) -> StoreResult<NotificationId> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO notifications (ticket_id, target, recipient, message, created_at, attempts)
            VALUES (?, ?, ?, ?, ?, 0)
            "#,
            params![
                notification.ticket_id.map(TicketId::get),
                notification.target.to_string(),
                notification.recipient,
                notification.message,
                time_to_sql(&notification.created_at),
            ],
        )?;

        let id = NotificationId::new(conn.last_insert_rowid());
        debug!(notification_id = %id, target = %notification.target, "Notification queued");
        Ok(id)
    }

    fn pending_notifications(&self, max_attempts: u32, limit: usize) -> StoreResult<Vec<Notification>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, ticket_id, target, recipient, message, created_at, attempts, last_error, delivered_at
            FROM notifications
            WHERE delivered_at IS NULL AND attempts < ?
            ORDER BY id
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![max_attempts, limit as i64], notification_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn mark_notification_delivered(&self, id: NotificationId, at: DateTime<Local>) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET delivered_at = ?, attempts = attempts + 1, last_error = NULL WHERE id = ?",
            params![time_to_sql(&at), id.get()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("notification {}", id)));
        }
        Ok(())
    }

    fn mark_notification_failed(&self, id: NotificationId, error: &str) -> StoreResult<u32> {
        let conn = self.conn()?;

        let attempts: Option<u32> = conn
            .query_row(
                "UPDATE notifications SET attempts = attempts + 1, last_error = ? WHERE id = ? RETURNING attempts",
                params![error, id.get()],
                |row| row.get(0),
            )
            .optional()?;

        let attempts = attempts.ok_or_else(|| StoreError::NotFound(format!("notification {}", id)))?;
        debug!(notification_id = %id, attempts, error, "Notification attempt failed");
        Ok(attempts)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => {
                conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
            }
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use deskline_api::NotifyTarget;

    fn notification(message: &str) -> Notification {
        Notification {
            id: NotificationId::new(0),
            ticket_id: Some(TicketId::new(1)),
            target: NotifyTarget::Assignee,
            recipient: Some("alice".into()),
            message: message.into(),
            created_at: deskline_util::now(),
            attempts: 0,
            last_error: None,
            delivered_at: None,
        }
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deskline.db");
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.is_healthy());
        assert!(path.exists());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted)).unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
                rule_count: 3,
                sla_policy_count: 1,
            }))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        // Most recent first
        assert!(matches!(events[0].event, AuditEventType::PolicyLoaded { rule_count: 3, .. }));
        assert!(matches!(events[1].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_notification_outbox() {
        let store = SqliteStore::in_memory().unwrap();

        let first = store.enqueue_notification(&notification("first")).unwrap();
        let second = store.enqueue_notification(&notification("second")).unwrap();

        let pending = store.pending_notifications(3, 10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[0].target, NotifyTarget::Assignee);

        store.mark_notification_delivered(first, deskline_util::now()).unwrap();

        // Second fails until it runs out of attempts
        assert_eq!(store.mark_notification_failed(second, "timeout").unwrap(), 1);
        let pending = store.pending_notifications(3, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("timeout"));

        store.mark_notification_failed(second, "timeout").unwrap();
        assert_eq!(store.mark_notification_failed(second, "timeout").unwrap(), 3);
        assert!(store.pending_notifications(3, 10).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_notification() {
        let store = SqliteStore::in_memory().unwrap();
        let missing = NotificationId::new(42);
        assert!(matches!(
            store.mark_notification_failed(missing, "x"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.mark_notification_delivered(missing, deskline_util::now()),
            Err(StoreError::NotFound(_))
        ));
    }
}
