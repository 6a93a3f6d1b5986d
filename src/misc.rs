//! Miscellaneous utilities

use chrono::{DateTime, Local};
use std::collections::HashSet;
use uuid::Uuid;

/// Whether the crate was built for Windows.
pub const IS_WINDOWS: bool = cfg!(windows);

/// Current local time, with its UTC offset.
pub fn current_time() -> DateTime<Local> {
    Local::now()
}

/// UUIDv4 generator that never hands out the same string twice
///
/// Generated helper names must not collide within one converted file.
#[derive(Debug, Clone, Default)]
pub struct UuidGenerator {
    used: HashSet<String>,
    dash: bool,
}

impl UuidGenerator {
    /// `dash` selects the hyphenated form over the 32-digit simple form.
    pub fn new(dash: bool) -> Self {
        Self {
            used: HashSet::new(),
            dash,
        }
    }

    pub fn generate(&mut self) -> String {
        loop {
            let uuid = Uuid::new_v4();
            let candidate = if self.dash {
                uuid.hyphenated().to_string()
            } else {
                uuid.simple().to_string()
            };
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// How many identifiers this generator has handed out.
    pub fn issued(&self) -> usize {
        self.used.len()
    }
}
