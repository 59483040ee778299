//! Transient-lock detection.
//!
//! Only momentary contention is worth retrying. Everything else (constraint
//! violations, syntax errors, missing tables) fails the same way on the next
//! attempt, so it goes straight back to the caller.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Lock contention; the same work is expected to succeed shortly.
    Retryable,
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        self == ErrorClass::Retryable
    }
}

/// Errors the transaction wrapper knows how to sort.
pub trait Classify {
    fn classify(&self) -> ErrorClass;
}

const TRANSIENT_MARKERS: &[&str] = &[
    "database is locked",
    "database table is locked",
    "busy",
    "sqlite_busy",
    "sqlite_locked",
    "lock timeout",
];

/// Classify a driver error message by its text.
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

impl Classify for String {
    fn classify(&self) -> ErrorClass {
        classify_message(self)
    }
}

impl Classify for &str {
    fn classify(&self) -> ErrorClass {
        classify_message(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_messages_are_retryable() {
        for message in [
            "database is locked",
            "Error: database table is locked: presets",
            "SQLITE_BUSY: cannot commit",
            "SQLITE_LOCKED",
            "resource busy",
            "lock timeout exceeded",
        ] {
            assert_eq!(classify_message(message), ErrorClass::Retryable, "{message}");
        }
    }

    #[test]
    fn other_messages_are_fatal() {
        for message in [
            "UNIQUE constraint failed: devices.name",
            "no such table: zones",
            "",
        ] {
            assert_eq!(classify_message(message), ErrorClass::Fatal, "{message}");
        }
    }

    #[test]
    fn string_errors_classify_by_text() {
        assert!("database is locked".to_string().classify().is_retryable());
        assert!(!"syntax error".classify().is_retryable());
    }
}
