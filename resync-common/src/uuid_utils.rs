//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse UUID from string, returning None for anything not well-formed
pub fn parse_opt(s: &str) -> Option<Uuid> {
    Uuid::parse_str(s).ok()
}
