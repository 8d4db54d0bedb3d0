//! Bounded event history with a durable daily log.
//!
//! [`EventLog`] keeps the most recent events in memory and mirrors every
//! appended event to `automation-YYYY-MM-DD.log` in the configured
//! directory, keyed by the UTC day of the event's timestamp. Files are
//! opened in append mode and never rewritten.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use autopost_core::event::Event;
use autopost_core::types::Timestamp;
use chrono::{NaiveDate, Utc};

/// Default number of events retained in memory.
pub const DEFAULT_CAPACITY: usize = 200;

/// File name prefix for the daily log files.
const LOG_FILE_PREFIX: &str = "automation";

// ---------------------------------------------------------------------------
// EventLogError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("Failed to create log directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to write event to {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// The log file for one calendar day, kept open while events for that day
/// keep arriving.
struct DayFile {
    date: NaiveDate,
    file: File,
}

/// Append-only event store: bounded in memory, unbounded on disk.
pub struct EventLog {
    dir: PathBuf,
    capacity: usize,
    history: VecDeque<Event>,
    current: Option<DayFile>,
    last_timestamp: Option<Timestamp>,
}

impl EventLog {
    /// Open a store writing into `dir`, creating the directory if needed.
    ///
    /// `capacity` is the number of events kept in memory (at least one).
    pub fn open(dir: impl Into<PathBuf>, capacity: usize) -> Result<Self, EventLogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| EventLogError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let capacity = capacity.max(1);
        Ok(Self {
            dir,
            capacity,
            history: VecDeque::with_capacity(capacity),
            current: None,
            last_timestamp: None,
        })
    }

    /// Append an event.
    ///
    /// The durable line is written before the event enters the in-memory
    /// history. A write failure is returned, but the event is still kept in
    /// memory so live observers are not starved by a broken disk.
    pub fn append(&mut self, event: Event) -> Result<(), EventLogError> {
        let written = self.write_line(&event);

        if self.last_timestamp.map_or(true, |last| event.timestamp > last) {
            self.last_timestamp = Some(event.timestamp);
        }

        self.history.push_back(event);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        written
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Number of events kept in memory, after clamping.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Timestamp for the next event: the current time, clamped so it never
    /// precedes the last appended event.
    pub fn next_timestamp(&self) -> Timestamp {
        let now = Utc::now();
        match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        }
    }

    /// Path of the durable log file for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{LOG_FILE_PREFIX}-{date}.log"))
    }

    fn write_line(&mut self, event: &Event) -> Result<(), EventLogError> {
        let date = event.timestamp.date_naive();
        let path = self.path_for(date);

        let mut line = event.log_line();
        line.push('\n');

        let result = self
            .day_file(date, &path)
            .and_then(|file| file.write_all(line.as_bytes()));

        result.map_err(|source| {
            // Reopen on the next append instead of reusing a broken handle.
            self.current = None;
            EventLogError::Write { path, source }
        })
    }

    /// The open file for `date`, rotating when the day changed.
    fn day_file(&mut self, date: NaiveDate, path: &Path) -> io::Result<&mut File> {
        let stale = self.current.as_ref().map_or(true, |day| day.date != date);
        if stale {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing::debug!(path = %path.display(), "Opened event log file");
            self.current = Some(DayFile { date, file });
        }

        match self.current.as_mut() {
            Some(day) => Ok(&mut day.file),
            None => Err(io::Error::other("event log file not open")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
