//! Domain types shared by the autopost crates.
//!
//! Pure data and validation, no I/O: the event record, job requests and
//! results, and the process-wide status record.

pub mod error;
pub mod event;
pub mod job;
pub mod status;
pub mod types;
