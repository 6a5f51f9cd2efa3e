//! SQLite persistence for tickets, reference tables, audit rows and
//! comments.
//!
//! All SQL lives here. Writers are serialized behind one connection;
//! `update_ticket` wraps read-apply-write in a single transaction so that
//! callers diff against exactly the row version they overwrite.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::catalog::{CatalogEntry, CatalogKind, SeedEntry};
use crate::error::TicketError;
use crate::types::{
    Comment, Modification, SortOrder, Ticket, TicketFilter, TicketPage, TicketSort, TicketType,
};

pub(crate) const DATE_FMT: &str = "%Y-%m-%d";

const TICKET_COLUMNS: &str = "id, ticket_num, type, title, description, url, status_id, crit_id, \
     center_id, tool_id, creation_date, modify_date, resolution_date, delete_date, \
     modify_reason, notifier, people, creator, pathway, supports, attached";

/// Ticket store backed by SQLite.
pub struct TicketStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl Clone for TicketStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            db_path: self.db_path.clone(),
        }
    }
}

impl TicketStore {
    /// Open or create the store at a specific path.
    pub fn open(path: &Path) -> Result<Self, TicketError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TicketError::Storage(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, TicketError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: PathBuf::from(":memory:"),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), TicketError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                ticket_num TEXT,
                type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                url TEXT,
                status_id INTEGER NOT NULL,
                crit_id INTEGER NOT NULL,
                center_id INTEGER,
                tool_id INTEGER NOT NULL,
                creation_date TEXT NOT NULL,
                modify_date TEXT,
                resolution_date TEXT,
                delete_date TEXT,
                modify_reason TEXT,
                notifier INTEGER,
                people TEXT NOT NULL DEFAULT '[]',
                creator INTEGER NOT NULL,
                pathway TEXT NOT NULL,
                supports INTEGER NOT NULL DEFAULT 0,
                attached TEXT NOT NULL DEFAULT '[]'
            )
            "#,
            [],
        )?;

        for kind in CatalogKind::ALL {
            conn.execute(
                &format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS {} (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        value TEXT NOT NULL UNIQUE,
                        "desc" TEXT NOT NULL
                    )
                    "#,
                    kind.table()
                ),
                [],
            )?;
        }

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS modifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                date TEXT NOT NULL,
                reason TEXT NOT NULL,
                field_name TEXT,
                old_value TEXT,
                new_value TEXT
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tickets_creation ON tickets(creation_date)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tickets_type ON tickets(type)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_modifications_ticket ON modifications(ticket_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_comments_ticket ON comments(ticket_id)",
            [],
        )?;

        Ok(())
    }

    // ========================================================================
    // Tickets
    // ========================================================================

    pub fn insert_ticket(&self, ticket: &Ticket) -> Result<(), TicketError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO tickets (id, ticket_num, type, title, description, url, status_id,
                crit_id, center_id, tool_id, creation_date, modify_date, resolution_date,
                delete_date, modify_reason, notifier, people, creator, pathway, supports, attached)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &ticket.id,
                &ticket.ticket_num,
                ticket.ticket_type.as_str(),
                &ticket.title,
                &ticket.description,
                &ticket.url,
                ticket.status_id,
                ticket.crit_id,
                ticket.center_id,
                ticket.tool_id,
                ticket.creation_date.format(DATE_FMT).to_string(),
                ticket.modify_date.map(|d| d.to_rfc3339()),
                ticket.resolution_date.map(|d| d.format(DATE_FMT).to_string()),
                ticket.delete_date.map(|d| d.format(DATE_FMT).to_string()),
                &ticket.modify_reason,
                ticket.notifier,
                serde_json::to_string(&ticket.people)?,
                ticket.creator,
                &ticket.pathway,
                ticket.supports,
                serde_json::to_string(&ticket.attached)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                &format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS),
                params![ticket_id],
                row_to_ticket,
            )
            .optional()?;
        Ok(result)
    }

    pub fn ticket_exists(&self, ticket_id: &str) -> Result<bool, TicketError> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM tickets WHERE id = ?",
                params![ticket_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Read-apply-write in one transaction. `apply` sees the row exactly as
    /// it is about to be overwritten; an error from it rolls everything
    /// back. Returns the row before and after.
    pub fn update_ticket<F>(
        &self,
        ticket_id: &str,
        apply: F,
    ) -> Result<(Ticket, Ticket), TicketError>
    where
        F: FnOnce(&Ticket) -> Result<Ticket, TicketError>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let before = read_ticket_tx(&tx, ticket_id)?
            .ok_or_else(|| TicketError::not_found(format!("Ticket {}", ticket_id)))?;
        let after = apply(&before)?;
        write_ticket_tx(&tx, &after)?;

        tx.commit()?;
        Ok((before, after))
    }

    /// Every ticket in the store. Used by maintenance sweeps.
    pub fn all_tickets(&self) -> Result<Vec<Ticket>, TicketError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tickets ORDER BY creation_date DESC, id",
            TICKET_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_ticket)?;
        let mut tickets = Vec::new();
        for row in rows {
            tickets.push(row?);
        }
        Ok(tickets)
    }

    /// Filtered, sorted, paginated listing plus the unpaged total.
    /// `hidden_status_ids` are excluded unless the filter asks otherwise.
    pub fn list_tickets(
        &self,
        filter: &TicketFilter,
        hidden_status_ids: &[i64],
    ) -> Result<TicketPage, TicketError> {
        let conn = self.conn.lock().unwrap();

        let mut where_sql = String::from(" WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.show_hidden && !hidden_status_ids.is_empty() {
            let placeholders: Vec<&str> = hidden_status_ids.iter().map(|_| "?").collect();
            where_sql.push_str(&format!(
                " AND status_id NOT IN ({})",
                placeholders.join(",")
            ));
            for id in hidden_status_ids {
                params_vec.push(Box::new(*id));
            }
        }

        if let Some(status_id) = filter.status_id {
            where_sql.push_str(" AND status_id = ?");
            params_vec.push(Box::new(status_id));
        }

        if let Some(ticket_type) = filter.ticket_type {
            where_sql.push_str(" AND type = ?");
            params_vec.push(Box::new(ticket_type.as_str().to_string()));
        }

        if let Some(crit_id) = filter.crit_id {
            where_sql.push_str(" AND crit_id = ?");
            params_vec.push(Box::new(crit_id));
        }

        if let Some(tool_id) = filter.tool_id {
            where_sql.push_str(" AND tool_id = ?");
            params_vec.push(Box::new(tool_id));
        }

        if let Some(center_id) = filter.center_id {
            where_sql.push_str(" AND center_id = ?");
            params_vec.push(Box::new(center_id));
        }

        if let Some(from) = filter.created_from {
            where_sql.push_str(" AND creation_date >= ?");
            params_vec.push(Box::new(from.format(DATE_FMT).to_string()));
        }

        if let Some(to) = filter.created_to {
            where_sql.push_str(" AND creation_date <= ?");
            params_vec.push(Box::new(to.format(DATE_FMT).to_string()));
        }

        if let Some(ref search) = filter.search {
            let needle = format!("%{}%", search.to_lowercase());
            where_sql.push_str(
                " AND (LOWER(id) LIKE ? OR LOWER(IFNULL(ticket_num, '')) LIKE ? \
                 OR LOWER(title) LIKE ? OR LOWER(description) LIKE ? \
                 OR LOWER(people) LIKE ? \
                 OR tool_id IN (SELECT id FROM tools WHERE LOWER(\"desc\") LIKE ?))",
            );
            for _ in 0..6 {
                params_vec.push(Box::new(needle.clone()));
            }
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM tickets{}", where_sql),
            params_refs.as_slice(),
            |row| row.get(0),
        )?;

        let order_col = match filter.sort_by {
            TicketSort::CreationDate => "creation_date",
            TicketSort::Title => "title COLLATE NOCASE",
            TicketSort::TicketNum => "ticket_num",
            TicketSort::Status => "status_id",
            TicketSort::Priority => "crit_id",
        };
        let order_dir = match filter.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 100);
        let offset = (page as u64 - 1) * page_size as u64;

        let sql = format!(
            "SELECT {} FROM tickets{} ORDER BY {} {}, id ASC LIMIT {} OFFSET {}",
            TICKET_COLUMNS, where_sql, order_col, order_dir, page_size, offset
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), row_to_ticket)?;
        let mut tickets = Vec::new();
        for row in rows {
            tickets.push(row?);
        }

        Ok(TicketPage {
            tickets,
            total: total as u64,
            page,
            page_size,
        })
    }

    /// Bump the endorsement counter, returning the new value.
    pub fn add_support(&self, ticket_id: &str) -> Result<i64, TicketError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE tickets SET supports = supports + 1 WHERE id = ?",
            params![ticket_id],
        )?;
        if changed == 0 {
            return Err(TicketError::not_found(format!("Ticket {}", ticket_id)));
        }
        let supports = conn.query_row(
            "SELECT supports FROM tickets WHERE id = ?",
            params![ticket_id],
            |row| row.get(0),
        )?;
        Ok(supports)
    }

    // ========================================================================
    // Reference tables
    // ========================================================================

    /// Insert seed entries that are not present yet, matched by value.
    /// Returns how many rows were added. Never mutates existing rows.
    pub fn seed_catalog(
        &self,
        kind: CatalogKind,
        entries: &[SeedEntry],
    ) -> Result<usize, TicketError> {
        let conn = self.conn.lock().unwrap();
        let mut added = 0;
        for entry in entries {
            added += conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (value, \"desc\") VALUES (?, ?)",
                    kind.table()
                ),
                params![&entry.value, &entry.desc],
            )?;
        }
        Ok(added)
    }

    pub fn catalog_entries(&self, kind: CatalogKind) -> Result<Vec<CatalogEntry>, TicketError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, value, \"desc\" FROM {} ORDER BY id",
            kind.table()
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(CatalogEntry {
                id: row.get(0)?,
                value: row.get(1)?,
                desc: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    // ========================================================================
    // Modifications (append-only)
    // ========================================================================

    /// Append one audit row; the id on the input is ignored. Returns the
    /// assigned row id.
    pub fn insert_modification(&self, m: &Modification) -> Result<i64, TicketError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO modifications (ticket_id, user_id, username, date, reason,
                field_name, old_value, new_value)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &m.ticket_id,
                m.user_id,
                &m.username,
                m.date.to_rfc3339(),
                &m.reason,
                &m.field_name,
                &m.old_value,
                &m.new_value,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All audit rows for a ticket, newest first.
    pub fn modifications_for(&self, ticket_id: &str) -> Result<Vec<Modification>, TicketError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, ticket_id, user_id, username, date, reason, field_name, old_value, new_value
            FROM modifications WHERE ticket_id = ?
            ORDER BY date DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map(params![ticket_id], |row| {
            Ok(Modification {
                id: row.get(0)?,
                ticket_id: row.get(1)?,
                user_id: row.get(2)?,
                username: row.get(3)?,
                date: parse_rfc3339(&row.get::<_, String>(4)?),
                reason: row.get(5)?,
                field_name: row.get(6)?,
                old_value: row.get(7)?,
                new_value: row.get(8)?,
            })
        })?;
        let mut mods = Vec::new();
        for row in rows {
            mods.push(row?);
        }
        Ok(mods)
    }

    // ========================================================================
    // Comments
    // ========================================================================

    pub fn insert_comment(
        &self,
        ticket_id: &str,
        user_id: i64,
        username: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Comment, TicketError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO comments (ticket_id, user_id, username, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![ticket_id, user_id, username, content, created_at.to_rfc3339()],
        )?;
        Ok(Comment {
            id: conn.last_insert_rowid(),
            ticket_id: ticket_id.to_string(),
            user_id,
            username: username.to_string(),
            content: content.to_string(),
            created_at,
        })
    }

    /// Comments for a ticket, newest first.
    pub fn comments_for(&self, ticket_id: &str) -> Result<Vec<Comment>, TicketError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, ticket_id, user_id, username, content, created_at
            FROM comments WHERE ticket_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map(params![ticket_id], |row| {
            Ok(Comment {
                id: row.get(0)?,
                ticket_id: row.get(1)?,
                user_id: row.get(2)?,
                username: row.get(3)?,
                content: row.get(4)?,
                created_at: parse_rfc3339(&row.get::<_, String>(5)?),
            })
        })?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    pub fn comment_count(&self, ticket_id: &str) -> Result<u64, TicketError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE ticket_id = ?",
            params![ticket_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub(crate) fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

fn read_ticket_tx(tx: &Transaction<'_>, ticket_id: &str) -> Result<Option<Ticket>, TicketError> {
    let result = tx
        .query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS),
            params![ticket_id],
            row_to_ticket,
        )
        .optional()?;
    Ok(result)
}

fn write_ticket_tx(tx: &Transaction<'_>, ticket: &Ticket) -> Result<(), TicketError> {
    tx.execute(
        r#"
        UPDATE tickets SET ticket_num = ?, type = ?, title = ?, description = ?, url = ?,
            status_id = ?, crit_id = ?, center_id = ?, tool_id = ?, creation_date = ?,
            modify_date = ?, resolution_date = ?, delete_date = ?, modify_reason = ?,
            notifier = ?, people = ?, creator = ?, pathway = ?, supports = ?, attached = ?
        WHERE id = ?
        "#,
        params![
            &ticket.ticket_num,
            ticket.ticket_type.as_str(),
            &ticket.title,
            &ticket.description,
            &ticket.url,
            ticket.status_id,
            ticket.crit_id,
            ticket.center_id,
            ticket.tool_id,
            ticket.creation_date.format(DATE_FMT).to_string(),
            ticket.modify_date.map(|d| d.to_rfc3339()),
            ticket.resolution_date.map(|d| d.format(DATE_FMT).to_string()),
            ticket.delete_date.map(|d| d.format(DATE_FMT).to_string()),
            &ticket.modify_reason,
            ticket.notifier,
            serde_json::to_string(&ticket.people)?,
            ticket.creator,
            &ticket.pathway,
            ticket.supports,
            serde_json::to_string(&ticket.attached)?,
            &ticket.id,
        ],
    )?;
    Ok(())
}

fn row_to_ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let type_str: String = row.get(2)?;
    let people_json: String = row.get(16)?;
    let attached_json: String = row.get(20)?;

    Ok(Ticket {
        id: row.get(0)?,
        ticket_num: row.get(1)?,
        ticket_type: TicketType::parse(&type_str).unwrap_or(TicketType::Incidence),
        title: row.get(3)?,
        description: row.get(4)?,
        url: row.get(5)?,
        status_id: row.get(6)?,
        crit_id: row.get(7)?,
        center_id: row.get(8)?,
        tool_id: row.get(9)?,
        creation_date: parse_date(&row.get::<_, String>(10)?),
        modify_date: row
            .get::<_, Option<String>>(11)?
            .map(|s| parse_rfc3339(&s)),
        resolution_date: row
            .get::<_, Option<String>>(12)?
            .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FMT).ok()),
        delete_date: row
            .get::<_, Option<String>>(13)?
            .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FMT).ok()),
        modify_reason: row.get(14)?,
        notifier: row.get(15)?,
        people: serde_json::from_str(&people_json).unwrap_or_default(),
        creator: row.get(17)?,
        pathway: row.get(18)?,
        supports: row.get(19)?,
        attached: serde_json::from_str(&attached_json).unwrap_or_default(),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .unwrap_or_else(|_| Utc::now().into())
        .with_timezone(&Utc)
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, DATE_FMT).unwrap_or_else(|_| Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::seed;

    fn test_store() -> (TicketStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TicketStore::open(&dir.path().join("tiquet.db")).unwrap();
        (store, dir)
    }

    fn sample_ticket(id: &str) -> Ticket {
        Ticket {
            id: id.to_string(),
            ticket_num: None,
            ticket_type: TicketType::Incidence,
            title: "Printer jammed".to_string(),
            description: "The floor 2 printer eats every page".to_string(),
            url: None,
            status_id: 1,
            crit_id: 1,
            center_id: None,
            tool_id: 1,
            creation_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            modify_date: Some(Utc::now()),
            resolution_date: None,
            delete_date: None,
            modify_reason: None,
            notifier: None,
            people: vec!["Marta".to_string()],
            creator: 7,
            pathway: "web".to_string(),
            supports: 0,
            attached: Vec::new(),
        }
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let (store, _dir) = test_store();
        let ticket = sample_ticket("INC000001");
        store.insert_ticket(&ticket).unwrap();

        let loaded = store.get_ticket("INC000001").unwrap().unwrap();
        assert_eq!(loaded.id, ticket.id);
        assert_eq!(loaded.title, ticket.title);
        assert_eq!(loaded.people, ticket.people);
        assert_eq!(loaded.creation_date, ticket.creation_date);
        assert_eq!(loaded.supports, 0);

        assert!(store.get_ticket("INC999999").unwrap().is_none());
        assert!(store.ticket_exists("INC000001").unwrap());
        assert!(!store.ticket_exists("INC999999").unwrap());
    }

    #[test]
    fn test_update_ticket_applies_and_returns_both_versions() {
        let (store, _dir) = test_store();
        store.insert_ticket(&sample_ticket("INC000002")).unwrap();

        let (before, after) = store
            .update_ticket("INC000002", |current| {
                let mut next = current.clone();
                next.title = "Printer fixed itself".to_string();
                next.supports = 3;
                Ok(next)
            })
            .unwrap();

        assert_eq!(before.title, "Printer jammed");
        assert_eq!(after.title, "Printer fixed itself");

        let loaded = store.get_ticket("INC000002").unwrap().unwrap();
        assert_eq!(loaded.title, "Printer fixed itself");
        assert_eq!(loaded.supports, 3);
    }

    #[test]
    fn test_update_ticket_rolls_back_on_apply_error() {
        let (store, _dir) = test_store();
        store.insert_ticket(&sample_ticket("INC000003")).unwrap();

        let result = store.update_ticket("INC000003", |_| {
            Err(TicketError::validation("refused"))
        });
        assert!(result.is_err());

        let loaded = store.get_ticket("INC000003").unwrap().unwrap();
        assert_eq!(loaded.title, "Printer jammed");
    }

    #[test]
    fn test_update_missing_ticket_is_not_found() {
        let (store, _dir) = test_store();
        let result = store.update_ticket("INC0FF0FF", |t| Ok(t.clone()));
        assert!(matches!(result, Err(TicketError::NotFound(_))));
    }

    #[test]
    fn test_seed_catalog_is_idempotent() {
        let (store, _dir) = test_store();
        let seeds = seed::default_seed();

        let added = store
            .seed_catalog(CatalogKind::Statuses, &seeds.statuses)
            .unwrap();
        assert_eq!(added, seeds.statuses.len());

        let added_again = store
            .seed_catalog(CatalogKind::Statuses, &seeds.statuses)
            .unwrap();
        assert_eq!(added_again, 0);

        let entries = store.catalog_entries(CatalogKind::Statuses).unwrap();
        assert_eq!(entries.len(), seeds.statuses.len());
        assert!(entries.iter().any(|e| e.value == "created"));
    }

    #[test]
    fn test_listing_filters_and_pagination() {
        let (store, _dir) = test_store();
        for i in 1..=5 {
            let mut t = sample_ticket(&format!("INC00000{}", i));
            t.creation_date = NaiveDate::from_ymd_opt(2025, 3, i as u32).unwrap();
            if i > 3 {
                t.ticket_type = TicketType::Suggestion;
                t.id = format!("SUG00000{}", i);
            }
            if i == 2 {
                t.status_id = 9; // pretend 9 is hidden
            }
            store.insert_ticket(&t).unwrap();
        }

        // Hidden statuses drop out by default.
        let page = store
            .list_tickets(&TicketFilter::default(), &[9])
            .unwrap();
        assert_eq!(page.total, 4);

        let page = store
            .list_tickets(
                &TicketFilter {
                    show_hidden: true,
                    ..Default::default()
                },
                &[9],
            )
            .unwrap();
        assert_eq!(page.total, 5);

        // Type filter.
        let page = store
            .list_tickets(
                &TicketFilter {
                    ticket_type: Some(TicketType::Suggestion),
                    ..Default::default()
                },
                &[],
            )
            .unwrap();
        assert_eq!(page.total, 2);

        // Pagination, newest first by default.
        let page = store
            .list_tickets(
                &TicketFilter {
                    page: 1,
                    page_size: 2,
                    show_hidden: true,
                    ..Default::default()
                },
                &[],
            )
            .unwrap();
        assert_eq!(page.tickets.len(), 2);
        assert_eq!(page.total, 5);
        assert_eq!(
            page.tickets[0].creation_date,
            NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
        );
    }

    #[test]
    fn test_listing_search_matches_title_and_people() {
        let (store, _dir) = test_store();
        let mut a = sample_ticket("INC0000AA");
        a.title = "VPN drops every hour".to_string();
        store.insert_ticket(&a).unwrap();

        let mut b = sample_ticket("INC0000BB");
        b.title = "Screen flicker".to_string();
        b.people = vec!["Oriol Vives".to_string()];
        store.insert_ticket(&b).unwrap();

        let page = store
            .list_tickets(
                &TicketFilter {
                    search: Some("vpn".to_string()),
                    ..Default::default()
                },
                &[],
            )
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.tickets[0].id, "INC0000AA");

        let page = store
            .list_tickets(
                &TicketFilter {
                    search: Some("oriol".to_string()),
                    ..Default::default()
                },
                &[],
            )
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.tickets[0].id, "INC0000BB");
    }

    #[test]
    fn test_modifications_append_and_read_newest_first() {
        let (store, _dir) = test_store();
        store.insert_ticket(&sample_ticket("INC0000CC")).unwrap();

        let base = Utc::now();
        for (i, offset) in [0i64, 5, 10].iter().enumerate() {
            let m = Modification {
                id: 0,
                ticket_id: "INC0000CC".to_string(),
                user_id: 7,
                username: "nuria".to_string(),
                date: base + chrono::Duration::seconds(*offset),
                reason: format!("change {}", i),
                field_name: Some("title".to_string()),
                old_value: Some("old".to_string()),
                new_value: Some("new".to_string()),
            };
            store.insert_modification(&m).unwrap();
        }

        let mods = store.modifications_for("INC0000CC").unwrap();
        assert_eq!(mods.len(), 3);
        assert_eq!(mods[0].reason, "change 2");
        assert_eq!(mods[2].reason, "change 0");
    }

    #[test]
    fn test_comments_roundtrip() {
        let (store, _dir) = test_store();
        store.insert_ticket(&sample_ticket("INC0000DD")).unwrap();

        let first = Utc::now();
        store
            .insert_comment("INC0000DD", 3, "pau", "looking at it", first)
            .unwrap();
        store
            .insert_comment(
                "INC0000DD",
                4,
                "laia",
                "same here",
                first + chrono::Duration::seconds(30),
            )
            .unwrap();

        let comments = store.comments_for("INC0000DD").unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].username, "laia");
        assert_eq!(store.comment_count("INC0000DD").unwrap(), 2);
    }

    #[test]
    fn test_add_support() {
        let (store, _dir) = test_store();
        store.insert_ticket(&sample_ticket("SUG0000EE")).unwrap();
        assert_eq!(store.add_support("SUG0000EE").unwrap(), 1);
        assert_eq!(store.add_support("SUG0000EE").unwrap(), 2);
        assert!(store.add_support("SUG9999EE").is_err());
    }
}
