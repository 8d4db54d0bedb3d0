//! The event record produced for every line of job output and every job
//! outcome.
//!
//! Events are immutable once created. The durable log line format lives
//! here as well so every writer renders events identically.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// EventLevel
// ---------------------------------------------------------------------------

/// Severity of an [`Event`].
///
/// Job stdout maps to `Info`, job stderr to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Error,
}

impl EventLevel {
    /// Lowercase name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A single structured, timestamped, leveled message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id generated at creation.
    pub id: Uuid,

    /// When the event was emitted (UTC).
    pub timestamp: Timestamp,

    pub level: EventLevel,

    pub message: String,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), level, message)
    }

    /// Create an event with an explicit timestamp.
    pub fn at(timestamp: Timestamp, level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, message)
    }

    /// Render the durable log line, without the trailing newline.
    ///
    /// Format: `[2026-10-16T08:15:02.113Z] INFO: message`. Embedded line
    /// breaks are escaped so one event always occupies one line.
    pub fn log_line(&self) -> String {
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let level = self.level.as_str().to_uppercase();
        let message = self.message.replace('\r', "\\r").replace('\n', "\\n");
        format!("[{timestamp}] {level}: {message}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
