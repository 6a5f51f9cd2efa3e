//! Append-only audit trail for tickets.
//!
//! Every field-level change lands here as one Modification row. Trail
//! writes are non-fatal by contract: they run after the primary commit
//! and a failure surfaces as a warning, never as an error to the caller.
//! For display, rows within one second of a group's newest row collapse
//! into a single entry with human descriptions in Catalan.

use chrono::Utc;
use tracing::warn;

use crate::catalog::Catalog;
use crate::error::TicketError;
use crate::store::TicketStore;
use crate::types::{ActingUser, Modification, ModificationGroup};

/// Rows this close to their group's anchor collapse into it.
const GROUP_WINDOW_MS: i64 = 1_000;

/// Records and renders the audit trail.
#[derive(Clone)]
pub struct AuditRecorder {
    store: TicketStore,
    catalog: Catalog,
}

impl AuditRecorder {
    pub fn new(store: TicketStore, catalog: Catalog) -> Self {
        Self { store, catalog }
    }

    /// Append a field-change row. Failures are logged and swallowed so a
    /// broken trail can never undo work already committed.
    pub fn record_change(
        &self,
        ticket_id: &str,
        user: &ActingUser,
        field_name: &str,
        old_value: String,
        new_value: String,
        reason: String,
    ) {
        let entry = Modification {
            id: 0,
            ticket_id: ticket_id.to_string(),
            user_id: user.id,
            username: user.username.clone(),
            date: Utc::now(),
            reason,
            field_name: Some(field_name.to_string()),
            old_value: Some(old_value),
            new_value: Some(new_value),
        };
        if let Err(e) = self.store.insert_modification(&entry) {
            warn!(
                "Audit write failed for ticket {} ({}): {}",
                ticket_id, entry.reason, e
            );
        }
    }

    /// Append a free-text row with no field tracking. Shown verbatim in
    /// the grouped history.
    pub fn record_note(&self, ticket_id: &str, user: &ActingUser, reason: String) {
        let entry = Modification {
            id: 0,
            ticket_id: ticket_id.to_string(),
            user_id: user.id,
            username: user.username.clone(),
            date: Utc::now(),
            reason,
            field_name: None,
            old_value: None,
            new_value: None,
        };
        if let Err(e) = self.store.insert_modification(&entry) {
            warn!(
                "Audit write failed for ticket {} ({}): {}",
                ticket_id, entry.reason, e
            );
        }
    }

    /// Raw rows, newest first.
    pub fn history(&self, ticket_id: &str) -> Result<Vec<Modification>, TicketError> {
        self.store.modifications_for(ticket_id)
    }

    /// Rows grouped for display, newest first. A row joins the current
    /// group while it is within one second of the group's anchor (its
    /// newest row); otherwise it starts a new group.
    pub fn grouped(&self, ticket_id: &str) -> Result<Vec<ModificationGroup>, TicketError> {
        let mods = self.store.modifications_for(ticket_id)?;
        let mut groups: Vec<ModificationGroup> = Vec::new();

        for m in mods {
            let change = match &m.field_name {
                Some(field) => self.describe(field, m.new_value.as_deref().unwrap_or("")),
                None => m.reason.clone(),
            };

            match groups.last_mut() {
                Some(group)
                    if (m.date - group.date).num_milliseconds().abs() <= GROUP_WINDOW_MS =>
                {
                    group.changes.push(change);
                    group.total_changes += 1;
                }
                _ => groups.push(ModificationGroup {
                    id: m.id,
                    user_id: m.user_id,
                    username: m.username.clone(),
                    date: m.date,
                    changes: vec![change],
                    total_changes: 1,
                }),
            }
        }

        Ok(groups)
    }

    /// Catalan description of one recorded change. Catalog ids resolve to
    /// their labels; anything unresolvable falls back to the raw value.
    pub fn describe(&self, field_name: &str, new_value: &str) -> String {
        let cleared = new_value.is_empty() || new_value == "0";

        let described = match field_name {
            "status_id" => lookup_id(new_value)
                .and_then(|id| self.catalog.status_by_id(id))
                .map(|s| format!("L'estat s'ha canviat per {}", s.desc)),
            "crit_id" => lookup_id(new_value)
                .and_then(|id| self.catalog.crit_by_id(id))
                .map(|c| format!("La prioritat ha passat a ser {}", c.desc)),
            "center_id" => lookup_id(new_value)
                .and_then(|id| self.catalog.center_by_id(id))
                .map(|c| format!("El centre s'ha canviat per {}", c.desc))
                .or_else(|| cleared.then(|| "S'ha eliminat el centre".to_string())),
            "tool_id" => lookup_id(new_value)
                .and_then(|id| self.catalog.tool_by_id(id))
                .map(|t| format!("L'eina s'ha canviat per {}", t.desc))
                .or_else(|| cleared.then(|| "S'ha eliminat l'eina".to_string())),
            "type" => {
                let label = if new_value == "incidence" {
                    "Incidència"
                } else {
                    "Suggeriment"
                };
                Some(format!("El tipus s'ha canviat per {}", label))
            }
            "title" if !new_value.is_empty() => {
                Some(format!("El títol s'ha canviat per \"{}\"", new_value))
            }
            "description" => Some("La descripció s'ha actualitzat".to_string()),
            "ticket_num" if !new_value.is_empty() => Some(format!(
                "El número de ticket s'ha canviat per {}",
                new_value
            )),
            "url" => Some(if new_value.is_empty() {
                "S'ha eliminat la URL".to_string()
            } else {
                format!("La URL s'ha canviat per {}", new_value)
            }),
            "notifier" => Some(if cleared {
                "S'ha eliminat el notificador".to_string()
            } else {
                format!("El notificador s'ha canviat per {}", new_value)
            }),
            "people" => Some("Les persones implicades s'han actualitzat".to_string()),
            "pathway" => {
                let label = match new_value {
                    "web" => "Web",
                    "mobile" => "Mòbil",
                    "email" => "Email",
                    "phone" => "Telèfon",
                    "in_person" => "En persona",
                    other => other,
                };
                Some(format!("La via de creació s'ha canviat per {}", label))
            }
            "attached" => Some(match new_value.parse::<i64>() {
                Ok(n) => format!("Els adjunts s'han actualitzat ({} fitxer(s))", n),
                Err(_) if new_value.is_empty() => {
                    "Els adjunts s'han actualitzat (0 fitxer(s))".to_string()
                }
                Err(_) => "Els adjunts s'han actualitzat".to_string(),
            }),
            _ => None,
        };

        described
            .unwrap_or_else(|| format!("{} s'ha canviat per {}", field_label(field_name), new_value))
    }
}

fn lookup_id(value: &str) -> Option<i64> {
    value.parse::<i64>().ok()
}

fn field_label(field_name: &str) -> &str {
    match field_name {
        "ticket_num" => "El número de ticket",
        "type" => "El tipus",
        "title" => "El títol",
        "description" => "La descripció",
        "url" => "La URL",
        "status_id" => "L'estat",
        "crit_id" => "La prioritat",
        "center_id" => "El centre",
        "tool_id" => "L'eina",
        "notifier" => "El notificador",
        "people" => "Les persones implicades",
        "pathway" => "La via de creació",
        "attached" => "Els adjunts",
        other => other,
    }
}
