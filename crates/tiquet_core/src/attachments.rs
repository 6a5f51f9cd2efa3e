//! File attachments for tickets.
//!
//! Binary content lives on disk under
//! `{upload_root}/tickets/{ticket_id}/attachments/{YYYY}/{MM}/`, metadata
//! lives on the ticket row. The filesystem answers "does the file still
//! exist"; the metadata list answers "what belongs to this ticket".
//! Uploads are batched with per-file acceptance, so one bad file never
//! sinks the rest. Every upload and removal lands one row in the audit
//! trail.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::audit::AuditRecorder;
use crate::error::TicketError;
use crate::store::TicketStore;
use crate::types::{ActingUser, Attachment, Ticket};

/// Per-file size ceiling (50 MiB), enforced while copying.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Extensions accepted for upload, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".txt", ".rtf", ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".xls",
    ".xlsx", ".csv", ".ppt", ".pptx", ".zip", ".rar", ".7z", ".tar", ".gz",
];

/// One file handed to [`AttachmentStore::upload`]. The body is consumed
/// while streaming to disk.
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: Option<String>,
    pub body: Box<dyn Read>,
}

impl IncomingFile {
    pub fn new(
        original_name: impl Into<String>,
        content_type: Option<String>,
        body: Box<dyn Read>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            content_type,
            body,
        }
    }

    /// In-memory body, for tests and CLI use.
    pub fn from_bytes(
        original_name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self::new(original_name, content_type, Box::new(io::Cursor::new(bytes)))
    }
}

/// One file the batch refused or failed to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpload {
    pub original_name: String,
    pub error: String,
}

/// Outcome of a batch upload. Acceptance is per file.
#[derive(Debug, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<Attachment>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    pub fn total_uploaded(&self) -> usize {
        self.uploaded.len()
    }

    pub fn total_failed(&self) -> usize {
        self.failed.len()
    }
}

/// Outcome of removing one attachment.
#[derive(Debug, Clone, Serialize)]
pub struct RemovedAttachment {
    pub attachment: Attachment,
    /// Metadata entries left on the ticket.
    pub remaining: usize,
}

/// A stored path resolved for reading, with the names a download needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAttachment {
    pub absolute_path: PathBuf,
    pub original_name: String,
    pub content_type: String,
}

/// Tally of a legacy-layout migration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// One metadata entry whose backing file is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingFile {
    pub ticket_id: String,
    pub path: String,
    pub original_name: String,
}

/// Metadata-vs-filesystem sweep results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    /// Metadata entries inspected across all tickets.
    pub entries_checked: usize,
    pub missing: Vec<MissingFile>,
    /// Files under the upload root no metadata references.
    pub orphans: Vec<String>,
}

enum CopyError {
    TooLarge,
    Io(io::Error),
}

/// Owns the upload root and every filesystem operation on attachments.
#[derive(Clone)]
pub struct AttachmentStore {
    upload_root: PathBuf,
    store: TicketStore,
    audit: AuditRecorder,
}

impl AttachmentStore {
    pub fn new(upload_root: impl Into<PathBuf>, store: TicketStore, audit: AuditRecorder) -> Self {
        Self {
            upload_root: upload_root.into(),
            store,
            audit,
        }
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    /// Store a batch of files on a ticket. Individual files can be
    /// refused (bad extension, oversize, write failure) without aborting
    /// the batch; accepted files are committed to the ticket's metadata
    /// list in one transaction. If that commit fails, every file the
    /// batch wrote is deleted again. One audit row summarizes the batch.
    pub fn upload(
        &self,
        ticket_id: &str,
        files: Vec<IncomingFile>,
        user: &ActingUser,
    ) -> Result<UploadReport, TicketError> {
        if !self.store.ticket_exists(ticket_id)? {
            return Err(TicketError::not_found(format!("Ticket {}", ticket_id)));
        }
        if files.is_empty() {
            return Err(TicketError::validation("No files provided"));
        }

        let now = Utc::now();
        let year_month = now.format("%Y/%m").to_string();

        let mut uploaded: Vec<Attachment> = Vec::new();
        let mut failed: Vec<FailedUpload> = Vec::new();

        for mut file in files {
            // The stored name carries the lowercased extension whatever
            // case the upload used.
            let ext = match extension_of(&file.original_name) {
                Some(ext) if is_allowed_extension(&ext) => ext.to_lowercase(),
                Some(ext) => {
                    failed.push(FailedUpload {
                        original_name: file.original_name,
                        error: format!("File extension {} not allowed", ext.to_lowercase()),
                    });
                    continue;
                }
                None => {
                    failed.push(FailedUpload {
                        original_name: file.original_name,
                        error: "File has no extension".to_string(),
                    });
                    continue;
                }
            };

            let generated = format!(
                "{}_{}{}",
                now.format("%Y%m%d_%H%M%S"),
                &uuid::Uuid::new_v4().simple().to_string()[..8],
                ext
            );
            let rel_path = format!(
                "tickets/{}/attachments/{}/{}",
                ticket_id, year_month, generated
            );
            let abs_path = self.upload_root.join(&rel_path);

            if let Some(parent) = abs_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    failed.push(FailedUpload {
                        original_name: file.original_name,
                        error: format!("Failed to save file: {}", e),
                    });
                    continue;
                }
            }

            match copy_capped(&mut file.body, &abs_path) {
                Ok((size, hash)) => {
                    uploaded.push(Attachment {
                        filename: generated,
                        original_name: file.original_name,
                        path: rel_path,
                        size,
                        hash,
                        uploaded_by: user.id,
                        uploaded_at: now,
                        file_type: ext.clone(),
                        content_type: file
                            .content_type
                            .unwrap_or_else(|| "application/octet-stream".to_string()),
                        ticket_id: ticket_id.to_string(),
                        file_exists: None,
                        last_modified: None,
                    });
                }
                Err(CopyError::TooLarge) => {
                    remove_quietly(&abs_path);
                    failed.push(FailedUpload {
                        original_name: file.original_name,
                        error: format!("File size exceeds limit of {} bytes", MAX_FILE_SIZE),
                    });
                }
                Err(CopyError::Io(e)) => {
                    remove_quietly(&abs_path);
                    failed.push(FailedUpload {
                        original_name: file.original_name,
                        error: format!("Failed to save file: {}", e),
                    });
                }
            }
        }

        if uploaded.is_empty() {
            return Ok(UploadReport { uploaded, failed });
        }

        let commit = self.store.update_ticket(ticket_id, |current| {
            let mut next = current.clone();
            next.attached.extend(uploaded.iter().cloned());
            next.modify_date = Some(Utc::now());
            Ok(next)
        });

        let (before, after) = match commit {
            Ok(pair) => pair,
            Err(e) => {
                // No orphan files on a failed logical write.
                for att in &uploaded {
                    remove_quietly(&self.upload_root.join(&att.path));
                }
                return Err(e);
            }
        };

        let names: Vec<&str> = uploaded.iter().map(|a| a.original_name.as_str()).collect();
        self.audit.record_change(
            ticket_id,
            user,
            "attached",
            before.attached.len().to_string(),
            after.attached.len().to_string(),
            format!("Files uploaded: {}", names.join(", ")),
        );
        info!(
            "Uploaded {} file(s) to ticket {} ({} refused)",
            uploaded.len(),
            ticket_id,
            failed.len()
        );

        Ok(UploadReport { uploaded, failed })
    }

    /// Metadata entries for a ticket, each augmented with `file_exists`
    /// and `last_modified` from the filesystem. Stored metadata is left
    /// untouched.
    pub fn list(&self, ticket_id: &str) -> Result<Vec<Attachment>, TicketError> {
        let ticket = self.require_ticket(ticket_id)?;

        let mut attachments = ticket.attached;
        for att in &mut attachments {
            let abs = self.upload_root.join(&att.path);
            match fs::metadata(&abs) {
                Ok(meta) => {
                    att.file_exists = Some(true);
                    att.last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
                }
                Err(_) => {
                    att.file_exists = Some(false);
                    att.last_modified = None;
                }
            }
        }
        Ok(attachments)
    }

    /// Resolve a stored relative path for reading. The path must be one
    /// of this ticket's own metadata entries and must live under the
    /// ticket's subtree; anything else is refused no matter how the
    /// string is spelled.
    pub fn resolve(
        &self,
        ticket_id: &str,
        rel_path: &str,
    ) -> Result<ResolvedAttachment, TicketError> {
        check_path_in_ticket(ticket_id, rel_path)?;

        let ticket = self.require_ticket(ticket_id)?;
        let att = ticket
            .attached
            .iter()
            .find(|a| a.path == rel_path)
            .ok_or_else(|| TicketError::not_found("Attachment"))?;

        let absolute_path = self.upload_root.join(&att.path);
        if !absolute_path.is_file() {
            return Err(TicketError::not_found("File"));
        }

        let original_name = if att.original_name.is_empty() {
            file_name_of(rel_path)
        } else {
            att.original_name.clone()
        };
        let content_type = if att.content_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            att.content_type.clone()
        };

        Ok(ResolvedAttachment {
            absolute_path,
            original_name,
            content_type,
        })
    }

    /// Remove one attachment, located by exact stored path first and by
    /// original display name as a fallback. A backing file that is
    /// already gone is tolerated; the metadata entry goes regardless.
    /// Now-empty date directories are pruned afterwards, stopping at the
    /// ticket's own root.
    pub fn remove(
        &self,
        ticket_id: &str,
        path_or_name: &str,
        user: &ActingUser,
    ) -> Result<RemovedAttachment, TicketError> {
        let ticket = self.require_ticket(ticket_id)?;

        let target = ticket
            .attached
            .iter()
            .find(|a| a.path == path_or_name)
            .or_else(|| ticket.attached.iter().find(|a| a.original_name == path_or_name))
            .cloned()
            .ok_or_else(|| TicketError::not_found("Attachment"))?;

        let abs_path = self.upload_root.join(&target.path);
        match fs::remove_file(&abs_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "Backing file for {} on ticket {} already missing, removing metadata only",
                    target.path, ticket_id
                );
            }
            Err(e) => {
                return Err(TicketError::Storage(format!(
                    "Failed to delete file {}: {}",
                    target.path, e
                )));
            }
        }

        let (before, after) = self.store.update_ticket(ticket_id, |current| {
            let mut next = current.clone();
            next.attached.retain(|a| a.path != target.path);
            next.modify_date = Some(Utc::now());
            Ok(next)
        })?;

        self.audit.record_change(
            ticket_id,
            user,
            "attached",
            before.attached.len().to_string(),
            after.attached.len().to_string(),
            format!("File deleted: {}", target.original_name),
        );

        self.prune_empty_dirs(ticket_id, &target.path);
        info!("Removed attachment {} from ticket {}", target.path, ticket_id);

        Ok(RemovedAttachment {
            attachment: target,
            remaining: after.attached.len(),
        })
    }

    /// Walk upward from the deleted file's directory removing empty
    /// directories, stopping at (and never removing) the ticket root.
    /// Best-effort by contract.
    fn prune_empty_dirs(&self, ticket_id: &str, rel_path: &str) {
        let ticket_root = self.upload_root.join("tickets").join(ticket_id);
        let mut current = match Path::new(rel_path).parent() {
            Some(parent) => self.upload_root.join(parent),
            None => return,
        };

        while current != ticket_root && current.starts_with(&ticket_root) {
            match fs::read_dir(&current) {
                Ok(mut entries) => {
                    if entries.next().is_some() {
                        break;
                    }
                }
                Err(_) => break,
            }
            if let Err(e) = fs::remove_dir(&current) {
                debug!("Could not prune directory {:?}: {}", current, e);
                break;
            }
            debug!("Pruned empty directory {:?}", current);
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
    }

    /// Move files recorded under the flat legacy `YYYY/MM/name` layout
    /// into the per-ticket tree, rewriting each ticket's metadata paths.
    /// Entries already under `tickets/` are skipped; a missing source
    /// file or a failed move keeps the old entry. Empty legacy date
    /// directories are pruned at the end.
    pub fn migrate_legacy_layout(&self) -> Result<MigrationReport, TicketError> {
        let mut report = MigrationReport::default();

        for ticket in self.store.all_tickets()? {
            if ticket.attached.is_empty() {
                continue;
            }

            let mut updated = ticket.attached.clone();
            let mut changed = false;

            for att in &mut updated {
                if att.path.starts_with("tickets/") {
                    report.skipped += 1;
                    continue;
                }

                let parts: Vec<&str> = att.path.split('/').collect();
                if parts.len() != 3 {
                    warn!(
                        "Attachment path {} on ticket {} has no recognizable layout, leaving it",
                        att.path, ticket.id
                    );
                    report.skipped += 1;
                    continue;
                }

                let new_rel = format!("tickets/{}/attachments/{}", ticket.id, att.path);
                let old_abs = self.upload_root.join(&att.path);
                let new_abs = self.upload_root.join(&new_rel);

                if !old_abs.is_file() {
                    warn!(
                        "Legacy file {} for ticket {} not found, keeping old entry",
                        att.path, ticket.id
                    );
                    report.skipped += 1;
                    continue;
                }

                if let Some(parent) = new_abs.parent() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        warn!("Failed to create {:?}: {}", parent, e);
                        report.failed += 1;
                        continue;
                    }
                }

                match fs::rename(&old_abs, &new_abs) {
                    Ok(()) => {
                        info!("Moved {} -> {}", att.path, new_rel);
                        att.path = new_rel;
                        changed = true;
                        report.moved += 1;
                    }
                    Err(e) => {
                        warn!("Failed to move {}: {}", att.path, e);
                        report.failed += 1;
                    }
                }
            }

            if changed {
                self.store.update_ticket(&ticket.id, |current| {
                    let mut next = current.clone();
                    next.attached = updated.clone();
                    Ok(next)
                })?;
            }
        }

        self.prune_legacy_dirs();
        Ok(report)
    }

    /// Remove now-empty `YYYY/MM` directories left behind by a
    /// migration. The `tickets/` tree is never touched.
    fn prune_legacy_dirs(&self) {
        let entries = match fs::read_dir(&self.upload_root) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let year_path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "tickets" || !year_path.is_dir() {
                continue;
            }
            if name.len() != 4 || !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            if let Ok(months) = fs::read_dir(&year_path) {
                for month in months.flatten() {
                    let month_path = month.path();
                    if month_path.is_dir() {
                        let _ = fs::remove_dir(&month_path);
                    }
                }
            }
            if let Err(e) = fs::remove_dir(&year_path) {
                debug!("Legacy directory {:?} kept: {}", year_path, e);
            }
        }
    }

    /// Sweep every ticket's metadata against the filesystem: entries
    /// whose backing file is gone, and files on disk no metadata
    /// references.
    pub fn verify(&self) -> Result<IntegrityReport, TicketError> {
        let mut report = IntegrityReport::default();
        let mut referenced: Vec<String> = Vec::new();

        for ticket in self.store.all_tickets()? {
            for att in &ticket.attached {
                report.entries_checked += 1;
                referenced.push(att.path.clone());
                if !self.upload_root.join(&att.path).is_file() {
                    report.missing.push(MissingFile {
                        ticket_id: ticket.id.clone(),
                        path: att.path.clone(),
                        original_name: att.original_name.clone(),
                    });
                }
            }
        }

        if self.upload_root.is_dir() {
            for entry in WalkDir::new(&self.upload_root)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = match entry.path().strip_prefix(&self.upload_root) {
                    Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                    Err(_) => continue,
                };
                if !referenced.iter().any(|p| p == &rel) {
                    report.orphans.push(rel);
                }
            }
        }
        report.orphans.sort();

        Ok(report)
    }

    fn require_ticket(&self, ticket_id: &str) -> Result<Ticket, TicketError> {
        self.store
            .get_ticket(ticket_id)?
            .ok_or_else(|| TicketError::not_found(format!("Ticket {}", ticket_id)))
    }
}

/// Stream to `dest`, hashing as bytes pass through and aborting past the
/// size ceiling. Returns the byte count and the SHA-256 hex digest.
fn copy_capped(body: &mut dyn Read, dest: &Path) -> Result<(u64, String), CopyError> {
    let mut out = fs::File::create(dest).map_err(CopyError::Io)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut total: u64 = 0;

    loop {
        let n = body.read(&mut buffer).map_err(CopyError::Io)?;
        if n == 0 {
            break;
        }
        total += n as u64;
        if total > MAX_FILE_SIZE {
            return Err(CopyError::TooLarge);
        }
        hasher.update(&buffer[..n]);
        out.write_all(&buffer[..n]).map_err(CopyError::Io)?;
    }
    out.flush().map_err(CopyError::Io)?;

    Ok((total, hex::encode(hasher.finalize())))
}

/// Extension including the dot, as spelled in the name.
fn extension_of(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_string_lossy().to_string();
    if ext.is_empty() {
        None
    } else {
        Some(format!(".{}", ext))
    }
}

fn is_allowed_extension(ext: &str) -> bool {
    let lower = ext.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&lower.as_str())
}

/// Reject any path string that could reach outside the ticket's own
/// subtree: absolute paths, parent/current components, empty segments,
/// backslashes, and paths not rooted at `tickets/{ticket_id}/`.
fn check_path_in_ticket(ticket_id: &str, rel_path: &str) -> Result<(), TicketError> {
    if rel_path.is_empty() || rel_path.starts_with('/') || rel_path.contains('\\') {
        return Err(TicketError::validation("Access denied"));
    }
    if rel_path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(TicketError::validation("Access denied"));
    }
    if !rel_path.starts_with(&format!("tickets/{}/", ticket_id)) {
        return Err(TicketError::validation("Access denied"));
    }
    Ok(())
}

fn file_name_of(rel_path: &str) -> String {
    Path::new(rel_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| rel_path.to_string())
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Could not remove {:?}: {}", path, e);
        }
    }
}
