//! Status state machine for tickets.
//!
//! The table below is the single authoritative copy of the lifecycle.
//! Enforcement happens in exactly one place, the engine's update path;
//! everything else (CLI, tests, listings) only reads it.
//!
//! Staying in the current status is always permitted. A from-status
//! missing from the table permits no transitions at all.

/// Allowed next statuses per current status, keyed by catalog `value`.
pub const STATUS_TRANSITIONS: &[(&str, &[&str])] = &[
    ("created", &["reviewed", "notified", "deleted"]),
    ("reviewed", &["notified", "closed", "solved", "deleted"]),
    ("notified", &["resolving", "deleted"]),
    ("resolving", &["on_hold", "closed", "solved", "deleted"]),
    ("on_hold", &["resolving", "closed", "solved", "deleted"]),
    ("closed", &["reopened", "deleted"]),
    ("solved", &["reopened", "deleted"]),
    ("deleted", &["reopened"]),
    ("reopened", &["notified", "closed", "solved", "deleted"]),
];

/// Legal next statuses from `from`. Unknown statuses allow nothing.
pub fn allowed_next(from: &str) -> &'static [&'static str] {
    STATUS_TRANSITIONS
        .iter()
        .find(|(status, _)| *status == from)
        .map(|(_, next)| *next)
        .unwrap_or(&[])
}

/// A status change is valid when it stays put or the table allows it.
pub fn is_valid_transition(from: &str, to: &str) -> bool {
    from == to || allowed_next(from).contains(&to)
}
