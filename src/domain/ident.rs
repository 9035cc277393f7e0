//! Deterministic identifiers for captured values.
//!
//! An item's id is a pure function of (stringified value, source position of
//! the access, parent id). Recomputing it for the same triple always yields
//! the same id, which lets a later run's items be matched against an earlier
//! run's for a stable visualization.

use std::fmt;

use sha2::{Digest, Sha256};

/// Source position of a property access or call site.
///
/// Captured via `#[track_caller]` at the engine's `get`/`call` entry points,
/// so the position refers to the user program's access, not engine internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[track_caller]
    pub fn here() -> Self {
        let loc = std::panic::Location::caller();
        Self {
            file: loc.file(),
            line: loc.line(),
            column: loc.column(),
        }
    }

    /// Placeholder for values observed outside any user access (e.g. roots).
    pub fn unknown() -> Self {
        Self {
            file: "<unknown>",
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Generate a deterministic id from a value's string form, the position of
/// the access that produced it, and the parent item's id.
pub fn gen_id(data: &str, position: Position, parent_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hasher.update(position.to_string().as_bytes());
    hasher.update(parent_id.as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}
