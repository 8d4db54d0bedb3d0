//! Status registry: the single record of whether a job is running and
//! which session is authenticated.
//!
//! Reads return a copy of the whole record. Mutations are reserved for the
//! supervisor and are keyed by job id, so a job that has already been
//! superseded can never overwrite the record of its successor.

use autopost_core::status::{ActiveJob, Status};
use autopost_core::types::JobId;

#[derive(Debug, Default)]
pub struct StatusRegistry {
    status: Status,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A consistent copy of the current status.
    pub fn get(&self) -> Status {
        self.status.clone()
    }

    /// The job holding the execution slot, if any.
    pub fn active(&self) -> Option<&ActiveJob> {
        self.status.active_job.as_ref()
    }

    /// Claim the execution slot for `job`.
    ///
    /// Returns the current holder if the slot is already taken.
    pub(crate) fn begin(&mut self, job: ActiveJob) -> Result<(), ActiveJob> {
        if let Some(active) = &self.status.active_job {
            return Err(active.clone());
        }
        self.status.job_active = true;
        self.status.active_job = Some(job);
        Ok(())
    }

    /// Release the slot held by `job_id`, committing `session` as the
    /// current session when given.
    ///
    /// Returns `false` (and changes nothing) if `job_id` does not hold the
    /// slot.
    pub(crate) fn finish(&mut self, job_id: JobId, session: Option<String>) -> bool {
        let holds_slot = self
            .status
            .active_job
            .as_ref()
            .is_some_and(|active| active.id == job_id);
        if !holds_slot {
            return false;
        }

        self.status.job_active = false;
        self.status.active_job = None;
        if let Some(session) = session {
            self.status.current_session = Some(session);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
