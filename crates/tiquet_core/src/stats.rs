//! Dashboard statistics.
//!
//! Read-only aggregates over the ticket table. Soft-deleted tickets
//! (delete_date set) are excluded everywhere; distribution labels come
//! from the catalog tables' descriptions.

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::TicketError;
use crate::store::{self, TicketStore};

/// Days of history covered by [`DashboardStats::trend`].
const TREND_DAYS: i64 = 30;

/// How many tools the by-tool ranking keeps.
const TOP_TOOLS: usize = 10;

/// One labeled count in a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountBucket {
    pub label: String,
    pub count: u64,
}

/// Tickets created on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    /// All non-deleted tickets.
    pub total_tickets: u64,
    /// Non-deleted tickets whose status is not terminal.
    pub open_tickets: u64,
    pub by_type: Vec<CountBucket>,
    pub by_status: Vec<CountBucket>,
    pub by_criticality: Vec<CountBucket>,
    pub by_center: Vec<CountBucket>,
    /// Most-used tools, busiest first, capped at ten.
    pub by_tool: Vec<CountBucket>,
    /// Daily creation counts over the last thirty days, oldest first.
    /// Days with no tickets are absent.
    pub trend: Vec<TrendPoint>,
}

pub fn dashboard_stats(
    store: &TicketStore,
    catalog: &Catalog,
) -> Result<DashboardStats, TicketError> {
    let conn = store.lock_conn();

    let total_tickets: u64 = conn.query_row(
        "SELECT COUNT(*) FROM tickets WHERE delete_date IS NULL",
        [],
        |row| row.get::<_, i64>(0),
    )? as u64;

    let hidden = catalog.hidden_status_ids();
    let open_tickets = if hidden.is_empty() {
        total_tickets
    } else {
        let placeholders: Vec<&str> = hidden.iter().map(|_| "?").collect();
        let sql = format!(
            "SELECT COUNT(*) FROM tickets WHERE delete_date IS NULL AND status_id NOT IN ({})",
            placeholders.join(",")
        );
        let params: Vec<&dyn rusqlite::ToSql> =
            hidden.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        conn.query_row(&sql, params.as_slice(), |row| row.get::<_, i64>(0))? as u64
    };

    let by_type = count_buckets(
        &conn,
        "SELECT type, COUNT(*) FROM tickets WHERE delete_date IS NULL GROUP BY type",
    )?;
    let by_status = count_buckets(
        &conn,
        r#"SELECT s."desc", COUNT(t.id) FROM tickets t
           JOIN statuses s ON t.status_id = s.id
           WHERE t.delete_date IS NULL GROUP BY s.id, s."desc""#,
    )?;
    let by_criticality = count_buckets(
        &conn,
        r#"SELECT c."desc", COUNT(t.id) FROM tickets t
           JOIN crits c ON t.crit_id = c.id
           WHERE t.delete_date IS NULL GROUP BY c.id, c."desc""#,
    )?;
    let by_center = count_buckets(
        &conn,
        r#"SELECT c."desc", COUNT(t.id) FROM tickets t
           JOIN centers c ON t.center_id = c.id
           WHERE t.delete_date IS NULL GROUP BY c.id, c."desc""#,
    )?;
    let by_tool = count_buckets(
        &conn,
        &format!(
            r#"SELECT c."desc", COUNT(t.id) FROM tickets t
               JOIN tools c ON t.tool_id = c.id
               WHERE t.delete_date IS NULL GROUP BY c.id, c."desc"
               ORDER BY COUNT(t.id) DESC LIMIT {}"#,
            TOP_TOOLS
        ),
    )?;

    let since = (Utc::now().date_naive() - Duration::days(TREND_DAYS))
        .format(store::DATE_FMT)
        .to_string();
    let mut stmt = conn.prepare(
        "SELECT creation_date, COUNT(*) FROM tickets \
         WHERE delete_date IS NULL AND creation_date >= ? \
         GROUP BY creation_date ORDER BY creation_date",
    )?;
    let rows = stmt.query_map([&since], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut trend = Vec::new();
    for row in rows {
        let (date, count) = row?;
        let date = NaiveDate::parse_from_str(&date, store::DATE_FMT)
            .map_err(|e| TicketError::Storage(format!("Bad creation_date '{}': {}", date, e)))?;
        trend.push(TrendPoint {
            date,
            count: count as u64,
        });
    }

    Ok(DashboardStats {
        total_tickets,
        open_tickets,
        by_type,
        by_status,
        by_criticality,
        by_center,
        by_tool,
        trend,
    })
}

fn count_buckets(conn: &rusqlite::Connection, sql: &str) -> Result<Vec<CountBucket>, TicketError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(CountBucket {
            label: row.get(0)?,
            count: row.get::<_, i64>(1)? as u64,
        })
    })?;
    let mut buckets = Vec::new();
    for row in rows {
        buckets.push(row?);
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::seed;
    use crate::lifecycle::TicketEngine;
    use crate::types::{ActingUser, NewTicket, TicketPatch, TicketType};

    fn engine() -> (TicketEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TicketStore::open(&dir.path().join("tiquet.db")).unwrap();
        let catalog = Catalog::load(&store, &seed::default_seed()).unwrap();
        let engine = TicketEngine::new(store, catalog, dir.path().join("uploads"));
        (engine, dir)
    }

    fn user() -> ActingUser {
        ActingUser::new(1, "admin")
    }

    fn new_ticket(ticket_type: TicketType, tool_id: i64) -> NewTicket {
        NewTicket {
            ticket_num: None,
            ticket_type,
            title: "t".to_string(),
            description: "d".to_string(),
            url: None,
            crit_id: 1,
            center_id: Some(1),
            tool_id,
            notifier: None,
            people: Vec::new(),
            pathway: "web".to_string(),
        }
    }

    #[test]
    fn test_counts_and_distributions_exclude_deleted() {
        let (engine, _dir) = engine();
        engine.create(new_ticket(TicketType::Incidence, 1), &user()).unwrap();
        engine.create(new_ticket(TicketType::Incidence, 2), &user()).unwrap();
        engine.create(new_ticket(TicketType::Suggestion, 1), &user()).unwrap();
        let doomed = engine.create(new_ticket(TicketType::Incidence, 3), &user()).unwrap();
        engine.delete(&doomed.id, &user()).unwrap();

        let stats = engine.dashboard_stats().unwrap();
        assert_eq!(stats.total_tickets, 3);
        assert_eq!(stats.open_tickets, 3);

        let incidences = stats.by_type.iter().find(|b| b.label == "incidence").unwrap();
        assert_eq!(incidences.count, 2);
        let suggestions = stats.by_type.iter().find(|b| b.label == "suggestion").unwrap();
        assert_eq!(suggestions.count, 1);

        // Status buckets use descriptions and omit the deleted ticket.
        let created = stats.by_status.iter().find(|b| b.label == "Creada").unwrap();
        assert_eq!(created.count, 3);
        assert_eq!(stats.by_status.iter().map(|b| b.count).sum::<u64>(), 3);
    }

    #[test]
    fn test_open_excludes_terminal_statuses() {
        let (engine, _dir) = engine();
        engine.create(new_ticket(TicketType::Incidence, 1), &user()).unwrap();
        let solved = engine.create(new_ticket(TicketType::Incidence, 1), &user()).unwrap();

        let reviewed = engine.catalog().status_by_value("reviewed").unwrap().id;
        let solved_id = engine.catalog().status_by_value("solved").unwrap().id;
        for status_id in [reviewed, solved_id] {
            engine
                .update(
                    &solved.id,
                    TicketPatch {
                        status_id: Some(status_id),
                        ..Default::default()
                    },
                    &user(),
                )
                .unwrap();
        }

        let stats = engine.dashboard_stats().unwrap();
        assert_eq!(stats.total_tickets, 2);
        assert_eq!(stats.open_tickets, 1);
    }

    #[test]
    fn test_tool_ranking_is_busiest_first() {
        let (engine, _dir) = engine();
        for _ in 0..3 {
            engine.create(new_ticket(TicketType::Incidence, 2), &user()).unwrap();
        }
        engine.create(new_ticket(TicketType::Incidence, 5), &user()).unwrap();

        let stats = engine.dashboard_stats().unwrap();
        assert_eq!(stats.by_tool.len(), 2);
        assert_eq!(stats.by_tool[0].label, "eConsulta");
        assert_eq!(stats.by_tool[0].count, 3);
        assert_eq!(stats.by_tool[1].count, 1);
    }

    #[test]
    fn test_trend_counts_todays_creations() {
        let (engine, _dir) = engine();
        engine.create(new_ticket(TicketType::Incidence, 1), &user()).unwrap();
        engine.create(new_ticket(TicketType::Suggestion, 1), &user()).unwrap();

        let stats = engine.dashboard_stats().unwrap();
        assert_eq!(stats.trend.len(), 1);
        assert_eq!(stats.trend[0].date, Utc::now().date_naive());
        assert_eq!(stats.trend[0].count, 2);
    }

    #[test]
    fn test_empty_store() {
        let (engine, _dir) = engine();
        let stats = engine.dashboard_stats().unwrap();
        assert_eq!(stats.total_tickets, 0);
        assert_eq!(stats.open_tickets, 0);
        assert!(stats.by_type.is_empty());
        assert!(stats.trend.is_empty());
    }
}
