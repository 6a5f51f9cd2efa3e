//! Error types for the ticket core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TicketError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Cannot change status from '{from}' to '{to}'. Valid transitions from '{from}': {}", .allowed.join(", "))]
    InvalidTransition {
        from: String,
        to: String,
        allowed: Vec<String>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TicketError {
    /// Shorthand for a missing-entity error ("Ticket INC1A2B3C", "Attachment", ...).
    pub fn not_found(what: impl Into<String>) -> Self {
        TicketError::NotFound(what.into())
    }

    /// Shorthand for an input-validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        TicketError::Validation(msg.into())
    }
}
