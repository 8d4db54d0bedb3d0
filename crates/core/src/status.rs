//! The process-wide status record.

use serde::{Deserialize, Serialize};

use crate::job::JobKind;
use crate::types::{JobId, Timestamp};

/// The job currently holding the single execution slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveJob {
    pub id: JobId,
    pub kind: JobKind,
    pub session: String,
    pub started_at: Timestamp,
}

/// Whether a job is running and which session is authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub job_active: bool,
    /// Session committed by the most recent successful login.
    pub current_session: Option<String>,
    pub active_job: Option<ActiveJob>,
}
