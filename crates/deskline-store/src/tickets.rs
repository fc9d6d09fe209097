//! Ticket tables

use deskline_api::{Requester, Ticket, TicketReply, TicketStatus};
use deskline_util::{AgentId, CategoryId, SlaPolicyId, TicketId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::sqlite::{get_opt_time, get_parsed, get_time, opt_time_to_sql, time_to_sql};
use crate::{SqliteStore, StoreError, StoreResult, TicketStore};

const TICKET_COLUMNS: &str = "id, subject, description, status, priority, category, assignee, \
    requester_kind, requester_id, source, tags_json, sla_policy, response_due_at, resolution_due_at, \
    first_response_at, resolved_at, closed_at, escalation_level, reopen_count, breach_notified, \
    created_at, updated_at";

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let tags_json: String = row.get(10)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

    Ok(Ticket {
        id: TicketId::new(row.get(0)?),
        subject: row.get(1)?,
        description: row.get(2)?,
        status: get_parsed(row, 3)?,
        priority: get_parsed(row, 4)?,
        category: row.get::<_, Option<String>>(5)?.map(CategoryId::new),
        assignee: row.get::<_, Option<String>>(6)?.map(AgentId::new),
        requester: Requester {
            kind: get_parsed(row, 7)?,
            id: row.get(8)?,
        },
        source: get_parsed(row, 9)?,
        tags,
        sla_policy: SlaPolicyId::new(row.get::<_, String>(11)?),
        response_due_at: get_time(row, 12)?,
        resolution_due_at: get_time(row, 13)?,
        first_response_at: get_opt_time(row, 14)?,
        resolved_at: get_opt_time(row, 15)?,
        closed_at: get_opt_time(row, 16)?,
        escalation_level: row.get(17)?,
        reopen_count: row.get(18)?,
        breach_notified: row.get(19)?,
        created_at: get_time(row, 20)?,
        updated_at: get_time(row, 21)?,
    })
}

fn reply_from_row(row: &Row<'_>) -> rusqlite::Result<TicketReply> {
    Ok(TicketReply {
        id: row.get(0)?,
        ticket_id: TicketId::new(row.get(1)?),
        author: AgentId::new(row.get::<_, String>(2)?),
        body: row.get(3)?,
        created_at: get_time(row, 4)?,
    })
}

fn write_ticket(conn: &Connection, ticket: &Ticket) -> StoreResult<()> {
    let tags_json = serde_json::to_string(&ticket.tags)?;

    let changed = conn.execute(
        r#"
        UPDATE tickets SET
            subject = ?, description = ?, status = ?, priority = ?, category = ?, assignee = ?,
            requester_kind = ?, requester_id = ?, source = ?, tags_json = ?, sla_policy = ?,
            response_due_at = ?, resolution_due_at = ?, first_response_at = ?, resolved_at = ?,
            closed_at = ?, escalation_level = ?, reopen_count = ?, breach_notified = ?,
            updated_at = ?
        WHERE id = ?
        "#,
        params![
            ticket.subject,
            ticket.description,
            ticket.status.as_str(),
            ticket.priority.as_str(),
            ticket.category.as_ref().map(|c| c.as_str()),
            ticket.assignee.as_ref().map(|a| a.as_str()),
            ticket.requester.kind.as_str(),
            ticket.requester.id,
            ticket.source.as_str(),
            tags_json,
            ticket.sla_policy.as_str(),
            time_to_sql(&ticket.response_due_at),
            time_to_sql(&ticket.resolution_due_at),
            opt_time_to_sql(&ticket.first_response_at),
            opt_time_to_sql(&ticket.resolved_at),
            opt_time_to_sql(&ticket.closed_at),
            ticket.escalation_level,
            ticket.reopen_count,
            ticket.breach_notified,
            time_to_sql(&ticket.updated_at),
            ticket.id.get(),
        ],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(format!("ticket {}", ticket.id)));
    }
    Ok(())
}

impl TicketStore for SqliteStore {
    fn insert_ticket(&self, ticket: &Ticket) -> StoreResult<TicketId> {
        let conn = self.conn()?;
        let tags_json = serde_json::to_string(&ticket.tags)?;

        conn.execute(
            r#"
            INSERT INTO tickets (
                subject, description, status, priority, category, assignee,
                requester_kind, requester_id, source, tags_json, sla_policy,
                response_due_at, resolution_due_at, first_response_at, resolved_at, closed_at,
                escalation_level, reopen_count, breach_notified, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                ticket.subject,
                ticket.description,
                ticket.status.as_str(),
                ticket.priority.as_str(),
                ticket.category.as_ref().map(|c| c.as_str()),
                ticket.assignee.as_ref().map(|a| a.as_str()),
                ticket.requester.kind.as_str(),
                ticket.requester.id,
                ticket.source.as_str(),
                tags_json,
                ticket.sla_policy.as_str(),
                time_to_sql(&ticket.response_due_at),
                time_to_sql(&ticket.resolution_due_at),
                opt_time_to_sql(&ticket.first_response_at),
                opt_time_to_sql(&ticket.resolved_at),
                opt_time_to_sql(&ticket.closed_at),
                ticket.escalation_level,
                ticket.reopen_count,
                ticket.breach_notified,
                time_to_sql(&ticket.created_at),
                time_to_sql(&ticket.updated_at),
            ],
        )?;

        let id = TicketId::new(conn.last_insert_rowid());
        debug!(ticket_id = %id, "Ticket inserted");
        Ok(id)
    }

    fn update_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
        let conn = self.conn()?;
        write_ticket(&conn, ticket)
    }

    fn get_ticket(&self, id: TicketId) -> StoreResult<Option<Ticket>> {
        let conn = self.conn()?;
        let ticket = conn
            .query_row(
                &format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS),
                [id.get()],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    fn delete_ticket(&self, id: TicketId) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM ticket_replies WHERE ticket_id = ?", [id.get()])?;
        let deleted = tx.execute("DELETE FROM tickets WHERE id = ?", [id.get()])?;
        tx.commit()?;

        if deleted > 0 {
            debug!(ticket_id = %id, "Ticket deleted");
        }
        Ok(deleted > 0)
    }

    fn list_tickets(&self, open_only: bool) -> StoreResult<Vec<Ticket>> {
        let conn = self.conn()?;
        let sql = if open_only {
            format!(
                "SELECT {} FROM tickets WHERE status NOT IN ('{}', '{}') ORDER BY id",
                TICKET_COLUMNS,
                TicketStatus::Resolved.as_str(),
                TicketStatus::Closed.as_str(),
            )
        } else {
            format!("SELECT {} FROM tickets ORDER BY id", TICKET_COLUMNS)
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], ticket_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn add_reply(&self, reply: &TicketReply, ticket: &Ticket) -> StoreResult<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO ticket_replies (ticket_id, author, body, created_at) VALUES (?, ?, ?, ?)",
            params![
                reply.ticket_id.get(),
                reply.author.as_str(),
                reply.body,
                time_to_sql(&reply.created_at),
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_ticket(&tx, ticket)?;
        tx.commit()?;
        Ok(id)
    }

    fn list_replies(&self, ticket_id: TicketId) -> StoreResult<Vec<TicketReply>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, author, body, created_at FROM ticket_replies WHERE ticket_id = ? ORDER BY id",
        )?;
        let rows = stmt.query_map([ticket_id.get()], reply_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use deskline_api::{RequesterKind, TicketPriority, TicketSource};

    fn sample_ticket() -> Ticket {
        let now = deskline_util::now();
        Ticket {
            id: TicketId::new(0),
            subject: "Printer on fire".into(),
            description: "It is on fire".into(),
            status: TicketStatus::Open,
            priority: TicketPriority::High,
            category: Some(CategoryId::new("hardware")),
            assignee: None,
            requester: Requester::new(RequesterKind::Client, 12),
            source: TicketSource::Email,
            tags: vec!["fire".into(), "printer".into()],
            sla_policy: SlaPolicyId::new("standard"),
            response_due_at: now + Duration::hours(4),
            resolution_due_at: now + Duration::hours(24),
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            escalation_level: 0,
            reopen_count: 0,
            breach_notified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn insert_and_load_ticket() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert_ticket(&sample_ticket()).unwrap();

        let loaded = store.get_ticket(id).unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.subject, "Printer on fire");
        assert_eq!(loaded.priority, TicketPriority::High);
        assert_eq!(loaded.requester, Requester::new(RequesterKind::Client, 12));
        assert_eq!(loaded.tags, vec!["fire", "printer"]);
        assert!(loaded.assignee.is_none());
        assert_eq!(
            loaded.resolution_due_at.timestamp(),
            sample_ticket().resolution_due_at.timestamp()
        );
    }

    #[test]
    fn update_ticket_persists_changes() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert_ticket(&sample_ticket()).unwrap();

        let mut ticket = store.get_ticket(id).unwrap().unwrap();
        ticket.status = TicketStatus::Resolved;
        ticket.resolved_at = Some(deskline_util::now());
        ticket.assignee = Some(AgentId::new("alice"));
        ticket.escalation_level = 2;
        store.update_ticket(&ticket).unwrap();

        let loaded = store.get_ticket(id).unwrap().unwrap();
        assert_eq!(loaded.status, TicketStatus::Resolved);
        assert!(loaded.resolved_at.is_some());
        assert_eq!(loaded.assignee, Some(AgentId::new("alice")));
        assert_eq!(loaded.escalation_level, 2);
    }

    #[test]
    fn update_missing_ticket_fails() {
        let store = SqliteStore::in_memory().unwrap();
        let mut ticket = sample_ticket();
        ticket.id = TicketId::new(99);
        assert!(matches!(store.update_ticket(&ticket), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn list_open_tickets_excludes_settled() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_ticket(&sample_ticket()).unwrap();
        let mut closed = sample_ticket();
        closed.status = TicketStatus::Closed;
        store.insert_ticket(&closed).unwrap();

        assert_eq!(store.list_tickets(false).unwrap().len(), 2);
        let open = store.list_tickets(true).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].status, TicketStatus::Open);
    }

    #[test]
    fn delete_ticket_removes_replies() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert_ticket(&sample_ticket()).unwrap();
        let ticket = store.get_ticket(id).unwrap().unwrap();
        store.add_reply(&reply(id, "Have you tried water?"), &ticket).unwrap();
        assert_eq!(store.list_replies(id).unwrap().len(), 1);

        assert!(store.delete_ticket(id).unwrap());
        assert!(!store.delete_ticket(id).unwrap());
        assert!(store.get_ticket(id).unwrap().is_none());
        assert!(store.list_replies(id).unwrap().is_empty());
    }

    fn reply(ticket_id: TicketId, body: &str) -> TicketReply {
        TicketReply {
            id: 0,
            ticket_id,
            author: AgentId::new("alice"),
            body: body.into(),
            created_at: deskline_util::now(),
        }
    }

    #[test]
    fn add_reply_updates_ticket_in_same_write() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert_ticket(&sample_ticket()).unwrap();

        let mut ticket = store.get_ticket(id).unwrap().unwrap();
        let answered = ticket.created_at + Duration::minutes(20);
        ticket.first_response_at = Some(answered);
        store.add_reply(&reply(id, "On it"), &ticket).unwrap();

        assert_eq!(store.get_ticket(id).unwrap().unwrap().first_response_at, Some(answered));
        assert_eq!(store.list_replies(id).unwrap()[0].body, "On it");
    }

    #[test]
    fn add_reply_rolls_back_when_ticket_write_fails() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert_ticket(&sample_ticket()).unwrap();

        // The reply row is valid but the ticket it stamps does not exist
        let mut ghost = store.get_ticket(id).unwrap().unwrap();
        ghost.id = TicketId::new(id.get() + 100);
        let err = store.add_reply(&reply(id, "Lost"), &ghost).unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.list_replies(id).unwrap().is_empty());
    }
}
