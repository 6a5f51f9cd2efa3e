//! Tiquet Core - domain library for the tiquet helpdesk tracker.
//!
//! Tickets (incidences and suggestions) with prefixed hex ids, a status
//! state machine, file attachments under a per-ticket directory tree and
//! an append-only audit trail. The request layer lives elsewhere; every
//! mutation in here flows through [`TicketEngine`].

pub mod attachments;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod idgen;
pub mod lifecycle;
pub mod stats;
pub mod store;
pub mod transitions;
pub mod types;

pub use attachments::{
    AttachmentStore, FailedUpload, IncomingFile, IntegrityReport, MigrationReport,
    RemovedAttachment, ResolvedAttachment, UploadReport,
};
pub use audit::AuditRecorder;
pub use catalog::{Catalog, CatalogEntry, CatalogKind, SeedEntry, SeedSet};
pub use config::TiquetConfig;
pub use error::TicketError;
pub use lifecycle::TicketEngine;
pub use stats::DashboardStats;
pub use store::TicketStore;
pub use types::{
    ActingUser, Attachment, Comment, Modification, ModificationGroup, NewTicket, SortOrder,
    Ticket, TicketFilter, TicketPage, TicketPatch, TicketSort, TicketType,
};
