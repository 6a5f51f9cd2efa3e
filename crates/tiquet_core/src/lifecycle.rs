//! Ticket lifecycle engine.
//!
//! The sole writer of ticket state. Every mutation flows through
//! [`TicketEngine`]: it validates catalog references, enforces the status
//! state machine, derives the terminal dates, and hands before/after
//! values to the audit recorder once the primary write has committed.

use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

use crate::attachments::{
    AttachmentStore, IncomingFile, RemovedAttachment, ResolvedAttachment, UploadReport,
};
use crate::audit::AuditRecorder;
use crate::catalog::{seed, Catalog};
use crate::config::TiquetConfig;
use crate::error::TicketError;
use crate::idgen;
use crate::stats::{self, DashboardStats};
use crate::store::TicketStore;
use crate::transitions::{allowed_next, is_valid_transition};
use crate::types::{
    ActingUser, Attachment, Comment, ModificationGroup, NewTicket, Ticket, TicketFilter,
    TicketPage, TicketPatch,
};

/// One audited field change, collected inside the update transaction and
/// written to the trail after it commits.
struct FieldChange {
    field: &'static str,
    old: String,
    new: String,
    reason: Option<String>,
}

#[derive(Clone)]
pub struct TicketEngine {
    store: TicketStore,
    catalog: Catalog,
    audit: AuditRecorder,
    attachments: AttachmentStore,
}

impl TicketEngine {
    pub fn new(store: TicketStore, catalog: Catalog, upload_root: impl Into<PathBuf>) -> Self {
        let audit = AuditRecorder::new(store.clone(), catalog.clone());
        let attachments = AttachmentStore::new(upload_root, store.clone(), audit.clone());
        Self {
            store,
            catalog,
            audit,
            attachments,
        }
    }

    /// Open the database and seed the catalog as the configuration says:
    /// JSON files from `catalog.seed_dir` when present, built-ins otherwise.
    pub fn from_config(config: &TiquetConfig) -> Result<Self, TicketError> {
        let store = TicketStore::open(&config.storage.db_path)?;
        let seeds = match &config.catalog.seed_dir {
            Some(dir) if dir.is_dir() => seed::load_dir(dir)?.0,
            _ => seed::default_seed(),
        };
        let catalog = Catalog::load(&store, &seeds)?;
        Ok(Self::new(
            store,
            catalog,
            config.storage.upload_root.clone(),
        ))
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub fn attachments(&self) -> &AttachmentStore {
        &self.attachments
    }

    // ========================================================================
    // Core mutations
    // ========================================================================

    /// Create a ticket in the catalog's initial status with a freshly
    /// generated id. Creation itself leaves no audit row; the trail starts
    /// with the first update.
    pub fn create(&self, input: NewTicket, user: &ActingUser) -> Result<Ticket, TicketError> {
        self.check_crit(input.crit_id)?;
        self.check_tool(input.tool_id)?;
        let center_id = normalize_center(input.center_id);
        if let Some(id) = center_id {
            self.check_center(id)?;
        }

        let initial = self.catalog.initial_status()?;
        let id = idgen::generate_ticket_id(input.ticket_type, |candidate| {
            self.store.ticket_exists(candidate)
        })?;

        let ticket = Ticket {
            id,
            ticket_num: input.ticket_num,
            ticket_type: input.ticket_type,
            title: input.title,
            description: input.description,
            url: input.url,
            status_id: initial.id,
            crit_id: input.crit_id,
            center_id,
            tool_id: input.tool_id,
            creation_date: Utc::now().date_naive(),
            modify_date: None,
            resolution_date: None,
            delete_date: None,
            modify_reason: None,
            notifier: input.notifier,
            people: input.people,
            creator: user.id,
            pathway: input.pathway,
            supports: 0,
            attached: Vec::new(),
        };
        self.store.insert_ticket(&ticket)?;

        info!(
            "Created {} ticket {} ({})",
            ticket.ticket_type.as_str(),
            ticket.id,
            user.username
        );
        Ok(ticket)
    }

    /// Apply a partial update. Fields are diffed against the row as read
    /// inside the write transaction; only values that actually differ are
    /// applied and audited. A status change is validated against the
    /// transition table and drives the terminal dates: entering "solved"
    /// or "deleted" stamps the matching date, leaving clears it. The
    /// modify timestamp refreshes on every call, changed or not.
    pub fn update(
        &self,
        ticket_id: &str,
        patch: TicketPatch,
        user: &ActingUser,
    ) -> Result<Ticket, TicketError> {
        let mut changes: Vec<FieldChange> = Vec::new();

        let (_, after) = self.store.update_ticket(ticket_id, |current| {
            let mut next = current.clone();

            if let Some(num) = &patch.ticket_num {
                if next.ticket_num != *num {
                    changes.push(FieldChange {
                        field: "ticket_num",
                        old: text_or_empty(&next.ticket_num),
                        new: text_or_empty(num),
                        reason: None,
                    });
                    next.ticket_num = num.clone();
                }
            }

            // Type is mutable; the id keeps its original prefix.
            if let Some(ticket_type) = patch.ticket_type {
                if next.ticket_type != ticket_type {
                    changes.push(FieldChange {
                        field: "type",
                        old: next.ticket_type.as_str().to_string(),
                        new: ticket_type.as_str().to_string(),
                        reason: None,
                    });
                    next.ticket_type = ticket_type;
                }
            }

            if let Some(title) = &patch.title {
                if next.title != *title {
                    changes.push(FieldChange {
                        field: "title",
                        old: next.title.clone(),
                        new: title.clone(),
                        reason: None,
                    });
                    next.title = title.clone();
                }
            }

            if let Some(description) = &patch.description {
                if next.description != *description {
                    changes.push(FieldChange {
                        field: "description",
                        old: next.description.clone(),
                        new: description.clone(),
                        reason: None,
                    });
                    next.description = description.clone();
                }
            }

            if let Some(url) = &patch.url {
                if next.url != *url {
                    changes.push(FieldChange {
                        field: "url",
                        old: text_or_empty(&next.url),
                        new: text_or_empty(url),
                        reason: None,
                    });
                    next.url = url.clone();
                }
            }

            if let Some(status_id) = patch.status_id {
                if status_id != next.status_id {
                    self.apply_status_change(&mut next, status_id, &patch, &mut changes)?;
                }
            }

            if let Some(crit_id) = patch.crit_id {
                if crit_id != next.crit_id {
                    self.check_crit(crit_id)?;
                    changes.push(FieldChange {
                        field: "crit_id",
                        old: next.crit_id.to_string(),
                        new: crit_id.to_string(),
                        reason: None,
                    });
                    next.crit_id = crit_id;
                }
            }

            if let Some(center) = patch.center_id {
                let center = normalize_center(center);
                if next.center_id != center {
                    if let Some(id) = center {
                        self.check_center(id)?;
                    }
                    changes.push(FieldChange {
                        field: "center_id",
                        old: id_or_empty(&next.center_id),
                        new: id_or_empty(&center),
                        reason: None,
                    });
                    next.center_id = center;
                }
            }

            if let Some(tool_id) = patch.tool_id {
                if tool_id != next.tool_id {
                    self.check_tool(tool_id)?;
                    changes.push(FieldChange {
                        field: "tool_id",
                        old: next.tool_id.to_string(),
                        new: tool_id.to_string(),
                        reason: None,
                    });
                    next.tool_id = tool_id;
                }
            }

            if let Some(notifier) = patch.notifier {
                if next.notifier != notifier {
                    changes.push(FieldChange {
                        field: "notifier",
                        old: id_or_empty(&next.notifier),
                        new: id_or_empty(&notifier),
                        reason: None,
                    });
                    next.notifier = notifier;
                }
            }

            if let Some(people) = &patch.people {
                if next.people != *people {
                    changes.push(FieldChange {
                        field: "people",
                        old: serde_json::to_string(&next.people)?,
                        new: serde_json::to_string(people)?,
                        reason: None,
                    });
                    next.people = people.clone();
                }
            }

            if let Some(pathway) = &patch.pathway {
                if next.pathway != *pathway {
                    changes.push(FieldChange {
                        field: "pathway",
                        old: next.pathway.clone(),
                        new: pathway.clone(),
                        reason: None,
                    });
                    next.pathway = pathway.clone();
                }
            }

            // Stored on the row, surfaced through the status-change audit
            // row; never a field change of its own.
            if let Some(reason) = &patch.modify_reason {
                next.modify_reason = Some(reason.clone());
            }

            next.modify_date = Some(Utc::now());
            Ok(next)
        })?;

        for change in &changes {
            let reason = change
                .reason
                .clone()
                .unwrap_or_else(|| format!("Updated {}", change.field));
            self.audit.record_change(
                &after.id,
                user,
                change.field,
                change.old.clone(),
                change.new.clone(),
                reason,
            );
        }
        if !changes.is_empty() {
            info!(
                "Updated ticket {} ({} field(s), {})",
                after.id,
                changes.len(),
                user.username
            );
        }

        Ok(after)
    }

    /// Validate and apply a status change on the in-transaction row.
    fn apply_status_change(
        &self,
        next: &mut Ticket,
        status_id: i64,
        patch: &TicketPatch,
        changes: &mut Vec<FieldChange>,
    ) -> Result<(), TicketError> {
        let new_status = self
            .catalog
            .status_by_id(status_id)
            .ok_or_else(|| TicketError::validation("Invalid status ID"))?;
        let current_status = self.catalog.status_by_id(next.status_id);

        if let Some(cur) = &current_status {
            if !is_valid_transition(&cur.value, &new_status.value) {
                let allowed = allowed_next(&cur.value)
                    .iter()
                    .map(|value| {
                        self.catalog
                            .status_by_value(value)
                            .map(|entry| entry.desc)
                            .unwrap_or_else(|| value.to_string())
                    })
                    .collect();
                return Err(TicketError::InvalidTransition {
                    from: cur.desc.clone(),
                    to: new_status.desc,
                    allowed,
                });
            }
        }

        let today = Utc::now().date_naive();
        let leaving = current_status.as_ref().map(|c| c.value.as_str());

        if new_status.value == "solved" {
            if next.resolution_date.is_none() {
                next.resolution_date = Some(today);
            }
        } else if leaving == Some("solved") {
            next.resolution_date = None;
        }
        if new_status.value == "deleted" {
            next.delete_date = Some(today);
        } else if leaving == Some("deleted") {
            next.delete_date = None;
        }

        changes.push(FieldChange {
            field: "status_id",
            old: next.status_id.to_string(),
            new: status_id.to_string(),
            reason: patch.modify_reason.clone(),
        });
        next.status_id = status_id;
        Ok(())
    }

    /// Soft delete: a status change to "deleted", which stamps the delete
    /// date and leaves the row and its attachments in place. Deleting an
    /// already-deleted ticket is a no-op.
    pub fn delete(&self, ticket_id: &str, user: &ActingUser) -> Result<Ticket, TicketError> {
        let current = self.get(ticket_id)?;
        let deleted = self
            .catalog
            .status_by_value("deleted")
            .ok_or_else(|| TicketError::validation("Status 'deleted' is not seeded"))?;
        if current.status_id == deleted.id {
            return Ok(current);
        }

        let patch = TicketPatch {
            status_id: Some(deleted.id),
            ..Default::default()
        };
        self.update(ticket_id, patch, user)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, ticket_id: &str) -> Result<Ticket, TicketError> {
        self.store
            .get_ticket(ticket_id)?
            .ok_or_else(|| TicketError::not_found(format!("Ticket {}", ticket_id)))
    }

    pub fn exists(&self, ticket_id: &str) -> Result<bool, TicketError> {
        self.store.ticket_exists(ticket_id)
    }

    /// Filtered listing. Tickets in hidden statuses stay out of the page
    /// unless the filter asks for them.
    pub fn list(&self, filter: &TicketFilter) -> Result<TicketPage, TicketError> {
        self.store
            .list_tickets(filter, &self.catalog.hidden_status_ids())
    }

    pub fn dashboard_stats(&self) -> Result<DashboardStats, TicketError> {
        stats::dashboard_stats(&self.store, &self.catalog)
    }

    // ========================================================================
    // Supports, comments, history
    // ========================================================================

    /// Endorsement counter bump. Leaves no audit row.
    pub fn add_support(&self, ticket_id: &str) -> Result<i64, TicketError> {
        self.store.add_support(ticket_id)
    }

    pub fn add_comment(
        &self,
        ticket_id: &str,
        user: &ActingUser,
        content: &str,
    ) -> Result<Comment, TicketError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(TicketError::validation("Comment content must not be empty"));
        }
        if !self.store.ticket_exists(ticket_id)? {
            return Err(TicketError::not_found(format!("Ticket {}", ticket_id)));
        }
        self.store
            .insert_comment(ticket_id, user.id, &user.username, content, Utc::now())
    }

    pub fn comments(&self, ticket_id: &str) -> Result<Vec<Comment>, TicketError> {
        if !self.store.ticket_exists(ticket_id)? {
            return Err(TicketError::not_found(format!("Ticket {}", ticket_id)));
        }
        self.store.comments_for(ticket_id)
    }

    pub fn comment_count(&self, ticket_id: &str) -> Result<u64, TicketError> {
        self.store.comment_count(ticket_id)
    }

    /// Modification history grouped for display, newest first.
    pub fn modification_groups(
        &self,
        ticket_id: &str,
    ) -> Result<Vec<ModificationGroup>, TicketError> {
        if !self.store.ticket_exists(ticket_id)? {
            return Err(TicketError::not_found(format!("Ticket {}", ticket_id)));
        }
        self.audit.grouped(ticket_id)
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    pub fn upload_attachments(
        &self,
        ticket_id: &str,
        files: Vec<IncomingFile>,
        user: &ActingUser,
    ) -> Result<UploadReport, TicketError> {
        self.attachments.upload(ticket_id, files, user)
    }

    pub fn remove_attachment(
        &self,
        ticket_id: &str,
        path_or_name: &str,
        user: &ActingUser,
    ) -> Result<RemovedAttachment, TicketError> {
        self.attachments.remove(ticket_id, path_or_name, user)
    }

    pub fn list_attachments(&self, ticket_id: &str) -> Result<Vec<Attachment>, TicketError> {
        self.attachments.list(ticket_id)
    }

    pub fn resolve_attachment(
        &self,
        ticket_id: &str,
        rel_path: &str,
    ) -> Result<ResolvedAttachment, TicketError> {
        self.attachments.resolve(ticket_id, rel_path)
    }

    fn check_crit(&self, id: i64) -> Result<(), TicketError> {
        if self.catalog.crit_by_id(id).is_none() {
            return Err(TicketError::validation(format!(
                "Unknown criticality ID {}",
                id
            )));
        }
        Ok(())
    }

    fn check_tool(&self, id: i64) -> Result<(), TicketError> {
        if self.catalog.tool_by_id(id).is_none() {
            return Err(TicketError::validation(format!("Unknown tool ID {}", id)));
        }
        Ok(())
    }

    fn check_center(&self, id: i64) -> Result<(), TicketError> {
        if self.catalog.center_by_id(id).is_none() {
            return Err(TicketError::validation(format!("Unknown center ID {}", id)));
        }
        Ok(())
    }
}

/// Callers send 0 to mean "no center".
fn normalize_center(center: Option<i64>) -> Option<i64> {
    match center {
        Some(0) => None,
        other => other,
    }
}

fn text_or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn id_or_empty(value: &Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SeedEntry;
    use crate::idgen::is_valid_ticket_id;
    use crate::types::TicketType;

    fn engine() -> (TicketEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TicketStore::open(&dir.path().join("tiquet.db")).unwrap();
        let catalog = Catalog::load(&store, &seed::default_seed()).unwrap();
        let engine = TicketEngine::new(store, catalog, dir.path().join("uploads"));
        (engine, dir)
    }

    fn user() -> ActingUser {
        ActingUser::new(3, "mserra")
    }

    fn incidence() -> NewTicket {
        NewTicket {
            ticket_num: None,
            ticket_type: TicketType::Incidence,
            title: "L'escàner no llegeix targetes".to_string(),
            description: "El lector de recepció rebutja totes les targetes".to_string(),
            url: None,
            crit_id: 1,
            center_id: None,
            tool_id: 1,
            notifier: None,
            people: Vec::new(),
            pathway: "web".to_string(),
        }
    }

    fn status_id(engine: &TicketEngine, value: &str) -> i64 {
        engine.catalog().status_by_value(value).unwrap().id
    }

    fn set_status(
        engine: &TicketEngine,
        ticket_id: &str,
        value: &str,
    ) -> Result<Ticket, TicketError> {
        let patch = TicketPatch {
            status_id: Some(status_id(engine, value)),
            ..Default::default()
        };
        engine.update(ticket_id, patch, &user())
    }

    #[test]
    fn test_create_defaults() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        assert!(is_valid_ticket_id(&ticket.id));
        assert!(ticket.id.starts_with("INC"));
        assert_eq!(ticket.status_id, status_id(&engine, "created"));
        assert_eq!(ticket.creator, 3);
        assert_eq!(ticket.supports, 0);
        assert!(ticket.attached.is_empty());
        assert_eq!(ticket.creation_date, Utc::now().date_naive());
        assert!(ticket.modify_date.is_none());
        assert!(ticket.resolution_date.is_none());

        // Creation leaves no trail.
        assert!(engine.modification_groups(&ticket.id).unwrap().is_empty());
    }

    #[test]
    fn test_create_validates_catalog_references() {
        let (engine, _dir) = engine();

        let mut bad_crit = incidence();
        bad_crit.crit_id = 999;
        assert!(matches!(
            engine.create(bad_crit, &user()),
            Err(TicketError::Validation(_))
        ));

        let mut bad_tool = incidence();
        bad_tool.tool_id = 999;
        assert!(matches!(
            engine.create(bad_tool, &user()),
            Err(TicketError::Validation(_))
        ));

        let mut bad_center = incidence();
        bad_center.center_id = Some(999);
        assert!(matches!(
            engine.create(bad_center, &user()),
            Err(TicketError::Validation(_))
        ));

        // Zero means "no center", not a reference.
        let mut no_center = incidence();
        no_center.center_id = Some(0);
        let ticket = engine.create(no_center, &user()).unwrap();
        assert_eq!(ticket.center_id, None);
    }

    #[test]
    fn test_update_diffs_and_audits_changed_fields_only() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let patch = TicketPatch {
            title: Some("L'escàner no llegeix cap targeta".to_string()),
            // Same value as stored: no row for this one.
            pathway: Some("web".to_string()),
            ..Default::default()
        };
        let updated = engine.update(&ticket.id, patch, &user()).unwrap();
        assert_eq!(updated.title, "L'escàner no llegeix cap targeta");
        assert!(updated.modify_date.is_some());

        let mods = engine.store().modifications_for(&ticket.id).unwrap();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].field_name.as_deref(), Some("title"));
        assert_eq!(mods[0].old_value.as_deref(), Some("L'escàner no llegeix targetes"));
        assert_eq!(mods[0].reason, "Updated title");
    }

    #[test]
    fn test_update_with_no_effective_change_emits_no_rows() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let patch = TicketPatch {
            title: Some(ticket.title.clone()),
            crit_id: Some(ticket.crit_id),
            ..Default::default()
        };
        let updated = engine.update(&ticket.id, patch, &user()).unwrap();

        assert!(engine.store().modifications_for(&ticket.id).unwrap().is_empty());
        // The modify timestamp still refreshes.
        assert!(updated.modify_date.is_some());
    }

    #[test]
    fn test_status_walk_and_illegal_transition() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let updated = set_status(&engine, &ticket.id, "notified").unwrap();
        assert_eq!(updated.status_id, status_id(&engine, "notified"));

        // notified does not go back to created.
        let err = set_status(&engine, &ticket.id, "created").unwrap_err();
        match err {
            TicketError::InvalidTransition { from, to, allowed } => {
                assert_eq!(from, "Notificada");
                assert_eq!(to, "Creada");
                assert_eq!(allowed, vec!["En resolució".to_string(), "Eliminada".to_string()]);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }

        // The failed attempt left no trace.
        let current = engine.get(&ticket.id).unwrap();
        assert_eq!(current.status_id, status_id(&engine, "notified"));
        let mods = engine.store().modifications_for(&ticket.id).unwrap();
        assert_eq!(mods.len(), 1);
    }

    #[test]
    fn test_unknown_status_id_is_validation_error() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let patch = TicketPatch {
            status_id: Some(999),
            ..Default::default()
        };
        let err = engine.update(&ticket.id, patch, &user()).unwrap_err();
        assert!(matches!(err, TicketError::Validation(ref m) if m == "Invalid status ID"));
    }

    #[test]
    fn test_solved_stamps_and_clears_resolution_date() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        set_status(&engine, &ticket.id, "reviewed").unwrap();
        let solved = set_status(&engine, &ticket.id, "solved").unwrap();
        assert_eq!(solved.resolution_date, Some(Utc::now().date_naive()));

        let reopened = set_status(&engine, &ticket.id, "reopened").unwrap();
        assert_eq!(reopened.resolution_date, None);
    }

    #[test]
    fn test_deleted_stamps_and_clears_delete_date() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let deleted = set_status(&engine, &ticket.id, "deleted").unwrap();
        assert_eq!(deleted.delete_date, Some(Utc::now().date_naive()));

        let reopened = set_status(&engine, &ticket.id, "reopened").unwrap();
        assert_eq!(reopened.delete_date, None);
        assert_eq!(reopened.status_id, status_id(&engine, "reopened"));
    }

    #[test]
    fn test_status_row_carries_modify_reason() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let patch = TicketPatch {
            status_id: Some(status_id(&engine, "reviewed")),
            title: Some("Escàner de recepció".to_string()),
            modify_reason: Some("Validat amb l'usuari".to_string()),
            ..Default::default()
        };
        let updated = engine.update(&ticket.id, patch, &user()).unwrap();
        assert_eq!(updated.modify_reason.as_deref(), Some("Validat amb l'usuari"));

        let mods = engine.store().modifications_for(&ticket.id).unwrap();
        assert_eq!(mods.len(), 2);
        let status_row = mods
            .iter()
            .find(|m| m.field_name.as_deref() == Some("status_id"))
            .unwrap();
        assert_eq!(status_row.reason, "Validat amb l'usuari");
        let title_row = mods
            .iter()
            .find(|m| m.field_name.as_deref() == Some("title"))
            .unwrap();
        assert_eq!(title_row.reason, "Updated title");
        // No row for modify_reason itself.
        assert!(mods.iter().all(|m| m.field_name.as_deref() != Some("modify_reason")));
    }

    #[test]
    fn test_people_change_is_stored_as_json() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let patch = TicketPatch {
            people: Some(vec!["Mireia Puig".to_string(), "Jordi Vila".to_string()]),
            ..Default::default()
        };
        engine.update(&ticket.id, patch, &user()).unwrap();

        let mods = engine.store().modifications_for(&ticket.id).unwrap();
        assert_eq!(mods[0].field_name.as_deref(), Some("people"));
        assert_eq!(mods[0].old_value.as_deref(), Some("[]"));
        assert_eq!(
            mods[0].new_value.as_deref(),
            Some(r#"["Mireia Puig","Jordi Vila"]"#)
        );
    }

    #[test]
    fn test_type_change_audits_as_type() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let patch = TicketPatch {
            ticket_type: Some(TicketType::Suggestion),
            ..Default::default()
        };
        let updated = engine.update(&ticket.id, patch, &user()).unwrap();
        assert_eq!(updated.ticket_type, TicketType::Suggestion);
        // The id keeps the prefix it was born with.
        assert!(updated.id.starts_with("INC"));

        let mods = engine.store().modifications_for(&ticket.id).unwrap();
        assert_eq!(mods[0].field_name.as_deref(), Some("type"));
        assert_eq!(mods[0].old_value.as_deref(), Some("incidence"));
        assert_eq!(mods[0].new_value.as_deref(), Some("suggestion"));
    }

    #[test]
    fn test_update_validates_references() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let patch = TicketPatch {
            crit_id: Some(999),
            ..Default::default()
        };
        assert!(matches!(
            engine.update(&ticket.id, patch, &user()),
            Err(TicketError::Validation(_))
        ));

        let patch = TicketPatch {
            center_id: Some(Some(999)),
            ..Default::default()
        };
        assert!(matches!(
            engine.update(&ticket.id, patch, &user()),
            Err(TicketError::Validation(_))
        ));

        // Center 0 normalizes to none.
        let patch = TicketPatch {
            center_id: Some(Some(0)),
            ..Default::default()
        };
        let updated = engine.update(&ticket.id, patch, &user()).unwrap();
        assert_eq!(updated.center_id, None);
    }

    #[test]
    fn test_update_missing_ticket_is_not_found() {
        let (engine, _dir) = engine();
        let patch = TicketPatch {
            title: Some("x".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            engine.update("INCFFFFFF", patch, &user()),
            Err(TicketError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_is_soft_and_idempotent() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        let deleted = engine.delete(&ticket.id, &user()).unwrap();
        assert_eq!(deleted.status_id, status_id(&engine, "deleted"));
        assert_eq!(deleted.delete_date, Some(Utc::now().date_naive()));

        // Still present, still readable.
        assert!(engine.exists(&ticket.id).unwrap());

        // Second delete changes nothing and emits nothing new.
        let before = engine.store().modifications_for(&ticket.id).unwrap().len();
        let again = engine.delete(&ticket.id, &user()).unwrap();
        assert_eq!(again.status_id, deleted.status_id);
        let after = engine.store().modifications_for(&ticket.id).unwrap().len();
        assert_eq!(before, after);

        assert!(matches!(
            engine.delete("INCFFFFFF", &user()),
            Err(TicketError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_hides_terminal_statuses_by_default() {
        let (engine, _dir) = engine();
        let open = engine.create(incidence(), &user()).unwrap();
        let gone = engine.create(incidence(), &user()).unwrap();
        engine.delete(&gone.id, &user()).unwrap();

        let page = engine.list(&TicketFilter::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.tickets[0].id, open.id);

        let all = engine
            .list(&TicketFilter {
                show_hidden: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(all.total, 2);
    }

    #[test]
    fn test_supports_counter() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        assert_eq!(engine.add_support(&ticket.id).unwrap(), 1);
        assert_eq!(engine.add_support(&ticket.id).unwrap(), 2);
        // No audit rows for the counter.
        assert!(engine.store().modifications_for(&ticket.id).unwrap().is_empty());
    }

    #[test]
    fn test_comments_require_content_and_ticket() {
        let (engine, _dir) = engine();
        let ticket = engine.create(incidence(), &user()).unwrap();

        assert!(matches!(
            engine.add_comment(&ticket.id, &user(), "   "),
            Err(TicketError::Validation(_))
        ));
        assert!(matches!(
            engine.add_comment("INCFFFFFF", &user(), "hola"),
            Err(TicketError::NotFound(_))
        ));

        engine.add_comment(&ticket.id, &user(), "Trucat al centre").unwrap();
        engine.add_comment(&ticket.id, &user(), "  Resolt in situ  ").unwrap();

        let comments = engine.comments(&ticket.id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].content, "Resolt in situ");
        assert_eq!(engine.comment_count(&ticket.id).unwrap(), 2);
    }

    #[test]
    fn test_from_config_uses_seed_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        let seed_dir = dir.path().join("seeds");
        std::fs::create_dir_all(&seed_dir).unwrap();
        seed::write_file(
            &seed_dir.join(crate::catalog::CatalogKind::Tools.file_name()),
            &[SeedEntry::new("intranet", "Intranet corporativa")],
        )
        .unwrap();

        let mut config = TiquetConfig::default();
        config.storage.db_path = dir.path().join("tiquet.db");
        config.storage.upload_root = dir.path().join("uploads");
        config.catalog.seed_dir = Some(seed_dir);

        let engine = TicketEngine::from_config(&config).unwrap();
        let tools = engine.catalog().tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].value, "intranet");
        // Kinds without a file keep the built-ins.
        assert!(!engine.catalog().statuses().is_empty());
    }
}
