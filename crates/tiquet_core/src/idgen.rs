//! Ticket id generation.
//!
//! An id is a 3-letter type prefix plus six uppercase hex characters
//! (INC4F2A9C, SUG00B512). Generation draws candidates at random and
//! consults the caller's collision predicate; after 100 collisions it
//! falls back to a clock-derived id so the call still terminates.

use rand::Rng;

use crate::error::TicketError;
use crate::types::TicketType;

const HEX_CHARS: &[u8] = b"0123456789ABCDEF";
const HEX_LEN: usize = 6;
const MAX_ATTEMPTS: usize = 100;

/// Generate a fresh ticket id. `exists` is consulted once per candidate;
/// the first free candidate wins.
pub fn generate_ticket_id<F>(ticket_type: TicketType, mut exists: F) -> Result<String, TicketError>
where
    F: FnMut(&str) -> Result<bool, TicketError>,
{
    let prefix = ticket_type.prefix();
    let mut rng = rand::thread_rng();

    for _ in 0..MAX_ATTEMPTS {
        let mut id = String::with_capacity(prefix.len() + HEX_LEN);
        id.push_str(prefix);
        for _ in 0..HEX_LEN {
            id.push(HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char);
        }
        if !exists(&id)? {
            return Ok(id);
        }
    }

    let secs = chrono::Utc::now().timestamp();
    Ok(format!("{}{:06X}", prefix, secs.rem_euclid(1_000_000)))
}

/// True for exactly `INC`/`SUG` plus six uppercase hex characters.
pub fn is_valid_ticket_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() != 9 {
        return false;
    }
    if &bytes[..3] != b"INC" && &bytes[..3] != b"SUG" {
        return false;
    }
    bytes[3..].iter().all(|b| HEX_CHARS.contains(b))
}

/// Recover the ticket type from an id's prefix.
pub fn ticket_type_from_id(id: &str) -> Result<TicketType, TicketError> {
    if !is_valid_ticket_id(id) {
        return Err(TicketError::validation(format!(
            "Invalid ticket id '{}'",
            id
        )));
    }
    if id.starts_with("INC") {
        Ok(TicketType::Incidence)
    } else {
        Ok(TicketType::Suggestion)
    }
}
