//! Job requests, kinds, and results.
//!
//! A [`JobRequest`] names one automation operation and carries its
//! kind-specific parameters. It is consumed by the supervisor and resolved
//! into exactly one [`JobResult`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CoreError;
use crate::types::JobId;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// The automation operations the supervisor knows how to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Login,
    Upload,
}

impl JobKind {
    /// Subcommand name passed to the automation script.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Upload => "upload",
        }
    }

    /// Capitalized prefix used for output line messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::Upload => "Upload",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// A request to run one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobRequest {
    /// Create a session for `session` by running the interactive login.
    Login { session: String },

    /// Upload `media` with `title` using the credentials of `session`.
    Upload {
        session: String,
        media: String,
        title: String,
    },
}

impl JobRequest {
    pub fn login(session: impl Into<String>) -> Self {
        Self::Login {
            session: session.into(),
        }
    }

    pub fn upload(
        session: impl Into<String>,
        media: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self::Upload {
            session: session.into(),
            media: media.into(),
            title: title.into(),
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Login { .. } => JobKind::Login,
            Self::Upload { .. } => JobKind::Upload,
        }
    }

    /// The session the job runs as.
    pub fn session(&self) -> &str {
        match self {
            Self::Login { session } | Self::Upload { session, .. } => session,
        }
    }

    /// Reject requests with blank parameters before anything is spawned.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fields: Vec<(&str, &str)> = match self {
            Self::Login { session } => vec![("session", session.as_str())],
            Self::Upload {
                session,
                media,
                title,
            } => vec![
                ("session", session.as_str()),
                ("media", media.as_str()),
                ("title", title.as_str()),
            ],
        };

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "{} job requires a non-empty {name}",
                    self.kind()
                )));
            }
        }
        Ok(())
    }

    /// Payload attached to the `jobSucceeded` notification.
    pub fn success_payload(&self) -> serde_json::Value {
        match self {
            Self::Login { session } => json!({ "username": session }),
            Self::Upload { media, title, .. } => json!({
                "video_path": media,
                "title": title,
            }),
        }
    }

    /// Terminal log message for a successful run.
    pub fn success_message(&self) -> String {
        match self {
            Self::Login { session } => format!("Successfully logged in user: {session}"),
            Self::Upload { media, .. } => format!("Successfully uploaded video: {media}"),
        }
    }

    /// Terminal log message for a failed run.
    pub fn failure_message(&self, failure: &JobFailure) -> String {
        match self {
            Self::Login { session } => format!("Login failed for user: {session} ({failure})"),
            Self::Upload { media, .. } => format!("Failed to upload video: {media} ({failure})"),
        }
    }
}

// ---------------------------------------------------------------------------
// JobFailure
// ---------------------------------------------------------------------------

/// Why a job did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobFailure {
    /// The executable could not be started.
    #[error("failed to start: {message}")]
    Spawn { message: String },

    /// The process exited with a non-zero code (or was killed by a signal).
    #[error("{}", exit_reason(.code, .stderr))]
    Exit { code: Option<i32>, stderr: String },

    /// The process outlived the configured job timeout and was killed.
    #[error("timed out after {secs}s")]
    TimedOut { secs: u64 },

    /// The job was cancelled by a caller.
    #[error("cancelled")]
    Cancelled,

    /// Waiting on the process failed.
    #[error("I/O error: {message}")]
    Io { message: String },
}

fn exit_reason(code: &Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl JobFailure {
    /// Operator-visible reason carried by the `jobFailed` notification.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

// ---------------------------------------------------------------------------
// JobResult
// ---------------------------------------------------------------------------

/// Outcome of one job, produced once at termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub kind: JobKind,
    /// Process exit code; `None` if the process never started or was killed.
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    /// Collected standard output.
    pub stdout: String,
    /// Collected standard error.
    pub stderr: String,
    pub failure: Option<JobFailure>,
}

impl JobResult {
    /// Result for a job whose process could not be started.
    pub fn spawn_failed(job_id: JobId, kind: JobKind, message: impl Into<String>) -> Self {
        Self {
            job_id,
            kind,
            exit_code: None,
            succeeded: false,
            stdout: String::new(),
            stderr: String::new(),
            failure: Some(JobFailure::Spawn {
                message: message.into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn kind_is_derived_from_request() {
        assert_eq!(JobRequest::login("alice").kind(), JobKind::Login);
        assert_eq!(
            JobRequest::upload("alice", "clip.mp4", "Hello").kind(),
            JobKind::Upload
        );
    }

    #[test]
    fn blank_parameters_are_rejected() {
        assert_matches!(
            JobRequest::login("  ").validate(),
            Err(CoreError::Validation(msg)) if msg.contains("session")
        );
        assert_matches!(
            JobRequest::upload("alice", "clip.mp4", "").validate(),
            Err(CoreError::Validation(msg)) if msg.contains("title")
        );
        assert!(JobRequest::upload("alice", "clip.mp4", "Hello")
            .validate()
            .is_ok());
    }

    #[test]
    fn success_payload_is_kind_specific() {
        let login = JobRequest::login("alice").success_payload();
        assert_eq!(login["username"], "alice");

        let upload = JobRequest::upload("alice", "clip.mp4", "Hello").success_payload();
        assert_eq!(upload["video_path"], "clip.mp4");
        assert_eq!(upload["title"], "Hello");
    }

    #[test]
    fn exit_failure_reason_prefers_stderr() {
        let failure = JobFailure::Exit {
            code: Some(1),
            stderr: "auth expired\n".to_string(),
        };
        assert_eq!(failure.reason(), "auth expired");

        let silent = JobFailure::Exit {
            code: Some(3),
            stderr: String::new(),
        };
        assert_eq!(silent.reason(), "exited with code 3");

        let killed = JobFailure::Exit {
            code: None,
            stderr: " ".to_string(),
        };
        assert_eq!(killed.reason(), "terminated by signal");
    }

    #[test]
    fn request_deserializes_from_tagged_json() {
        let request: JobRequest = serde_json::from_value(serde_json::json!({
            "kind": "upload",
            "session": "alice",
            "media": "clip.mp4",
            "title": "Hello",
        }))
        .expect("deserialize");
        assert_eq!(request, JobRequest::upload("alice", "clip.mp4", "Hello"));
    }

    #[test]
    fn spawn_failed_result_is_not_successful() {
        let result = JobResult::spawn_failed(JobId::new_v4(), JobKind::Login, "No such file");
        assert!(!result.succeeded);
        assert!(result.exit_code.is_none());
        assert_matches!(result.failure, Some(JobFailure::Spawn { .. }));
    }
}
