//! Core ticket records shared across the workspace.
//!
//! These are the persisted shapes: what a ticket is, what an attachment
//! metadata entry is, what an audit row looks like. Anything that touches
//! the database round-trips through these types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TicketError;

/// Kind of ticket, encoded in the id prefix (INC / SUG).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    Incidence,
    Suggestion,
}

impl TicketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketType::Incidence => "incidence",
            TicketType::Suggestion => "suggestion",
        }
    }

    /// Id prefix for this kind of ticket.
    pub fn prefix(&self) -> &'static str {
        match self {
            TicketType::Incidence => "INC",
            TicketType::Suggestion => "SUG",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TicketError> {
        match s {
            "incidence" => Ok(TicketType::Incidence),
            "suggestion" => Ok(TicketType::Suggestion),
            other => Err(TicketError::validation(format!(
                "Unknown ticket type '{}' (expected 'incidence' or 'suggestion')",
                other
            ))),
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who is performing an operation. Identity is established by the caller;
/// the core only records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    pub id: i64,
    pub username: String,
}

impl ActingUser {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// One stored attachment metadata entry, kept as JSON on the ticket row.
///
/// `file_exists` and `last_modified` are filled in from the filesystem when
/// listing; they are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub original_name: String,
    pub path: String,
    pub size: u64,
    pub hash: String,
    pub uploaded_by: i64,
    pub uploaded_at: DateTime<Utc>,
    pub file_type: String,
    pub content_type: String,
    pub ticket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_exists: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// A ticket as persisted. Mutations go through the engine only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub ticket_num: Option<String>,
    pub ticket_type: TicketType,
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub status_id: i64,
    pub crit_id: i64,
    pub center_id: Option<i64>,
    pub tool_id: i64,
    /// Set once at creation.
    pub creation_date: NaiveDate,
    /// Refreshed on every mutation, uploads and removals included.
    pub modify_date: Option<DateTime<Utc>>,
    /// Present if and only if the current status is `solved`.
    pub resolution_date: Option<NaiveDate>,
    /// Present if and only if the current status is `deleted`.
    pub delete_date: Option<NaiveDate>,
    pub modify_reason: Option<String>,
    pub notifier: Option<i64>,
    pub people: Vec<String>,
    pub creator: i64,
    pub pathway: String,
    pub supports: i64,
    pub attached: Vec<Attachment>,
}

/// Input for creating a ticket. Identity, status and dates are assigned
/// by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    #[serde(default)]
    pub ticket_num: Option<String>,
    pub ticket_type: TicketType,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
    pub crit_id: i64,
    #[serde(default)]
    pub center_id: Option<i64>,
    pub tool_id: i64,
    #[serde(default)]
    pub notifier: Option<i64>,
    #[serde(default)]
    pub people: Vec<String>,
    pub pathway: String,
}

/// Deserializer for nested options: a present key (even `null`) lands in
/// `Some(..)`, since serde's stock `Option<Option<T>>` impl would collapse
/// `null` into the outer `None` and lose the absent/null distinction.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Field-level patch for updates.
///
/// An outer `None` leaves the field untouched. Nullable fields carry a
/// nested `Option` so that clearing (`Some(None)`) stays distinguishable
/// from not touching at all; in JSON that is `null` vs. an absent key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketPatch {
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ticket_num: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<TicketType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crit_id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub center_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notifier: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pathway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_reason: Option<String>,
}

impl TicketPatch {
    /// True when the patch touches nothing.
    pub fn is_empty(&self) -> bool {
        self.ticket_num.is_none()
            && self.ticket_type.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.url.is_none()
            && self.status_id.is_none()
            && self.crit_id.is_none()
            && self.center_id.is_none()
            && self.tool_id.is_none()
            && self.notifier.is_none()
            && self.people.is_none()
            && self.pathway.is_none()
            && self.modify_reason.is_none()
    }
}

/// One append-only audit row. Field-level: one row per changed field,
/// except attachment batches which record one row per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub id: i64,
    pub ticket_id: String,
    pub user_id: i64,
    pub username: String,
    pub date: DateTime<Utc>,
    pub reason: String,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Audit rows collapsed for display: rows within one second of the group
/// anchor (its newest row) are shown as a single entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationGroup {
    /// Row id of the anchor.
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    /// Timestamp of the anchor.
    pub date: DateTime<Utc>,
    pub changes: Vec<String>,
    pub total_changes: usize,
}

/// A comment on a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub ticket_id: String,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Listing
// ============================================================================

/// Sort key for ticket listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketSort {
    #[default]
    CreationDate,
    Title,
    TicketNum,
    Status,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Query over the ticket table. All criteria are optional and combine
/// with AND.
#[derive(Debug, Clone)]
pub struct TicketFilter {
    pub status_id: Option<i64>,
    pub ticket_type: Option<TicketType>,
    pub crit_id: Option<i64>,
    pub tool_id: Option<i64>,
    pub center_id: Option<i64>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    /// Case-insensitive match on id, ticket_num, title, description,
    /// people and tool label.
    pub search: Option<String>,
    /// Include tickets in hidden statuses (discarted, solved, closed,
    /// deleted). Off by default.
    pub show_hidden: bool,
    pub sort_by: TicketSort,
    pub sort_order: SortOrder,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl Default for TicketFilter {
    fn default() -> Self {
        Self {
            status_id: None,
            ticket_type: None,
            crit_id: None,
            tool_id: None,
            center_id: None,
            created_from: None,
            created_to: None,
            search: None,
            show_hidden: false,
            sort_by: TicketSort::default(),
            sort_order: SortOrder::default(),
            page: 1,
            page_size: 50,
        }
    }
}

/// One page of a ticket listing plus the unpaged total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPage {
    pub tickets: Vec<Ticket>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}
