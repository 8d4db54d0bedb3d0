//! Job supervisor: runs at most one automation job at a time and turns its
//! output into events.
//!
//! [`Supervisor`] owns the event log, the broadcast hub, and the status
//! registry behind a single mutex, so every state transition (append and
//! publish, claiming and releasing the job slot, subscribing with a
//! snapshot) is atomic with respect to the others. The lock is never held
//! across an `.await` or a process spawn; pipe reads and the exit wait run
//! on a per-job Tokio task outside it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use autopost_core::error::CoreError;
use autopost_core::event::{Event, EventLevel};
use autopost_core::job::{JobFailure, JobKind, JobRequest, JobResult};
use autopost_core::status::{ActiveJob, Status};
use autopost_core::types::JobId;
use autopost_events::{BroadcastHub, EventLog, EventLogError, Notification, Observer, ObserverId};
use chrono::Utc;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::command::JobCommand;
use crate::config::SupervisorConfig;
use crate::lines;
use crate::registry::StatusRegistry;
use crate::sessions::SessionRegistry;

/// Maximum stdout or stderr text collected per job (1 MiB).
///
/// Every line is still emitted as an event; only the copy kept for the
/// [`JobResult`] is capped.
const MAX_COLLECTED_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// SupervisorError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Another job holds the execution slot. Not fatal; retry later.
    #[error("A {kind} job is already running ({job_id})")]
    AlreadyRunning { job_id: JobId, kind: JobKind },

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] EventLogError),
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything mutated by jobs and observers, guarded as one unit.
struct PlaneState {
    log: EventLog,
    hub: BroadcastHub,
    registry: StatusRegistry,
    /// Cancellation token of the job holding the slot.
    active_cancel: Option<(JobId, CancellationToken)>,
    /// Slot reserved by a request whose process is being spawned. Not part
    /// of [`Status`]; the job only becomes active once the spawn succeeded.
    spawning: Option<(JobId, JobKind)>,
    snapshot_events: usize,
}

impl PlaneState {
    /// The job holding or reserving the slot, if any.
    fn occupant(&self) -> Option<(JobId, JobKind)> {
        self.registry
            .active()
            .map(|active| (active.id, active.kind))
            .or(self.spawning)
    }

    /// Append an event and publish it to every observer.
    ///
    /// A durable write failure is reported through tracing and does not
    /// stop the event from reaching history and observers.
    fn record(&mut self, level: EventLevel, message: impl Into<String>) -> Event {
        let event = Event::at(self.log.next_timestamp(), level, message);
        if let Err(e) = self.log.append(event.clone()) {
            tracing::error!(error = %e, event_id = %event.id, "Failed to persist event");
        }
        self.hub.publish(Notification::Log(event.clone()));
        event
    }
}

struct Inner {
    state: Mutex<PlaneState>,
    command: JobCommand,
    sessions: SessionRegistry,
    job_timeout: Option<Duration>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PlaneState> {
        // State transitions never panic half-way, so a poisoned lock still
        // guards consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, level: EventLevel, message: impl Into<String>) -> Event {
        self.lock().record(level, message)
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Entry point for collaborators: start jobs, query status and history,
/// and subscribe to live notifications.
///
/// Cheaply cloneable; clones share the same state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Open the event log and build an idle supervisor.
    pub fn new(config: SupervisorConfig) -> Result<Self, SupervisorError> {
        let log = EventLog::open(&config.logs_dir, config.history_capacity)?;
        let history_capacity = log.capacity();

        let state = PlaneState {
            log,
            hub: BroadcastHub::new(config.observer_buffer),
            registry: StatusRegistry::new(),
            active_cancel: None,
            spawning: None,
            snapshot_events: config.snapshot_events,
        };

        tracing::info!(
            logs_dir = %config.logs_dir.display(),
            history_capacity,
            interpreter = %config.command.interpreter,
            script = %config.command.script,
            timeout_secs = config.job_timeout.map(|t| t.as_secs()),
            "Supervisor ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                command: config.command,
                sessions: SessionRegistry::new(config.cookies_dir),
                job_timeout: config.job_timeout,
            }),
        })
    }

    /// Start a job.
    ///
    /// Rejects with [`SupervisorError::AlreadyRunning`] while another job
    /// holds the slot; nothing is spawned in that case. A process that
    /// cannot be started is not an error here: the returned handle is
    /// already resolved with a failed [`JobResult`] and the slot was never
    /// claimed.
    ///
    /// The slot is reserved before the process is spawned and the lock is
    /// released for the spawn itself; competing requests are rejected
    /// against the reservation.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start_job(&self, request: JobRequest) -> Result<JobHandle, SupervisorError> {
        request.validate()?;

        let job_id = JobId::new_v4();
        let kind = request.kind();

        {
            let mut state = self.inner.lock();
            if let Some((active_id, active_kind)) = state.occupant() {
                tracing::info!(
                    active_job_id = %active_id,
                    requested = %kind,
                    "Rejected job, another job is running"
                );
                return Err(SupervisorError::AlreadyRunning {
                    job_id: active_id,
                    kind: active_kind,
                });
            }
            state.spawning = Some((job_id, kind));
        }

        let spawned = self.inner.command.build(&request).spawn();

        let mut state = self.inner.lock();
        state.spawning = None;

        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(%job_id, %kind, error = %e, "Failed to spawn job");
                let result = JobResult::spawn_failed(job_id, kind, e.to_string());
                if let Some(failure) = &result.failure {
                    state.record(EventLevel::Error, request.failure_message(failure));
                    state.hub.publish(Notification::JobFailed {
                        job_id,
                        kind,
                        reason: failure.reason(),
                    });
                }
                return Ok(JobHandle::resolved(result));
            }
        };

        let claimed = state.registry.begin(ActiveJob {
            id: job_id,
            kind,
            session: request.session().to_string(),
            started_at: Utc::now(),
        });
        if let Err(active) = claimed {
            // Unreachable while the reservation was held. Dropping `child`
            // kills it.
            return Err(SupervisorError::AlreadyRunning {
                job_id: active.id,
                kind: active.kind,
            });
        }

        let cancel = CancellationToken::new();
        state.active_cancel = Some((job_id, cancel.clone()));
        state.record(
            EventLevel::Info,
            format!("Started {kind} job for session {}", request.session()),
        );
        drop(state);

        tracing::info!(%job_id, %kind, pid = child.id(), "Job started");

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let result = run_job(&inner, job_id, &request, child, task_cancel).await;
            let _ = tx.send(result);
        });

        Ok(JobHandle {
            job_id,
            kind,
            cancel,
            result: rx,
        })
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.inner.lock().registry.get()
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        self.inner.lock().log.recent(limit)
    }

    /// Register a live observer. Its first notification is a status
    /// snapshot with the most recent history.
    pub fn subscribe(&self) -> Observer {
        let mut state = self.inner.lock();
        let status = state.registry.get();
        let events = state.log.recent(state.snapshot_events);
        state.hub.subscribe(status, events)
    }

    /// Remove an observer. Idempotent.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.lock().hub.unsubscribe(id)
    }

    /// Sessions with stored credentials.
    pub fn sessions(&self) -> Vec<String> {
        self.inner.sessions.list()
    }

    /// Cancel the running job, if any. Returns `false` when idle.
    pub fn cancel_active(&self) -> bool {
        match &self.inner.lock().active_cancel {
            Some((job_id, token)) => {
                tracing::info!(%job_id, "Cancelling active job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Record an operator event that did not come from a job, e.g. a media
    /// file received by the upload endpoint.
    pub fn record(&self, level: EventLevel, message: impl Into<String>) -> Event {
        self.inner.record(level, message)
    }
}

// ---------------------------------------------------------------------------
// JobHandle
// ---------------------------------------------------------------------------

/// Handle to an accepted job.
///
/// Dropping the handle does not stop the job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    kind: JobKind,
    cancel: CancellationToken,
    result: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    fn resolved(result: JobResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let handle = Self {
            job_id: result.job_id,
            kind: result.kind,
            cancel: CancellationToken::new(),
            result: rx,
        };
        let _ = tx.send(result);
        handle
    }

    pub fn id(&self) -> JobId {
        self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Kill the job. It resolves as a [`JobFailure::Cancelled`] failure.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this job, for use after [`wait`](Self::wait)
    /// consumed the handle.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the job to terminate.
    pub async fn wait(self) -> JobResult {
        match self.result.await {
            Ok(result) => result,
            Err(_) => JobResult {
                job_id: self.job_id,
                kind: self.kind,
                exit_code: None,
                succeeded: false,
                stdout: String::new(),
                stderr: String::new(),
                failure: Some(JobFailure::Io {
                    message: "job task ended without a result".to_string(),
                }),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Job task
// ---------------------------------------------------------------------------

/// How the wait on a job ended.
enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

/// Stream the job's output until it exits, then settle status and emit the
/// terminal notification.
async fn run_job(
    inner: &Inner,
    job_id: JobId,
    request: &JobRequest,
    mut child: Child,
    cancel: CancellationToken,
) -> JobResult {
    let kind = request.kind();
    let label = kind.label();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let mut stdout_text = Captured::new(MAX_COLLECTED_BYTES);
    let mut stderr_text = Captured::new(MAX_COLLECTED_BYTES);

    let outcome = {
        let streams = async {
            let out = lines::read_lines(stdout, |line| {
                stdout_text.push(&line);
                inner.record(EventLevel::Info, format!("{label}: {line}"));
            });
            let err = lines::read_lines(stderr, |line| {
                stderr_text.push(&line);
                inner.record(EventLevel::Error, format!("{label} Error: {line}"));
            });
            let (out, err) = tokio::join!(out, err);
            for (stream, result) in [("stdout", out), ("stderr", err)] {
                if let Err(e) = result {
                    tracing::warn!(%job_id, stream, error = %e, "Failed to read job output");
                }
            }
        };

        // Drain both pipes before reaping so every line is recorded ahead
        // of the terminal event.
        let exited = async {
            streams.await;
            child.wait().await
        };

        tokio::select! {
            status = exited => Outcome::Exited(status),
            _ = cancel.cancelled() => Outcome::Cancelled,
            limit = expire(inner.job_timeout) => Outcome::TimedOut(limit),
        }
    };

    if !matches!(outcome, Outcome::Exited(_)) {
        if let Err(e) = child.start_kill() {
            tracing::warn!(%job_id, error = %e, "Failed to kill job");
        }
        let _ = child.wait().await;
    }

    let (exit_code, failure) = match outcome {
        Outcome::Exited(Ok(status)) if status.success() => (status.code(), None),
        Outcome::Exited(Ok(status)) => (
            status.code(),
            Some(JobFailure::Exit {
                code: status.code(),
                stderr: stderr_text.text.clone(),
            }),
        ),
        Outcome::Exited(Err(e)) => (
            None,
            Some(JobFailure::Io {
                message: e.to_string(),
            }),
        ),
        Outcome::Cancelled => (None, Some(JobFailure::Cancelled)),
        Outcome::TimedOut(limit) => (
            None,
            Some(JobFailure::TimedOut {
                secs: limit.as_secs(),
            }),
        ),
    };

    settle(inner, job_id, request, failure.as_ref());

    match &failure {
        None => tracing::info!(%job_id, %kind, "Job succeeded"),
        Some(f) => tracing::warn!(%job_id, %kind, exit_code, reason = %f, "Job failed"),
    }

    JobResult {
        job_id,
        kind,
        exit_code,
        succeeded: failure.is_none(),
        stdout: stdout_text.text,
        stderr: stderr_text.text,
        failure,
    }
}

/// Release the slot and emit the terminal event and notification.
fn settle(inner: &Inner, job_id: JobId, request: &JobRequest, failure: Option<&JobFailure>) {
    let kind = request.kind();
    let mut state = inner.lock();

    if state
        .active_cancel
        .as_ref()
        .is_some_and(|(id, _)| *id == job_id)
    {
        state.active_cancel = None;
    }

    match failure {
        None => {
            let session = match request {
                JobRequest::Login { session } => Some(session.clone()),
                JobRequest::Upload { .. } => None,
            };
            state.registry.finish(job_id, session);
            state.record(EventLevel::Info, request.success_message());
            state.hub.publish(Notification::JobSucceeded {
                job_id,
                kind,
                payload: request.success_payload(),
            });
        }
        Some(failure) => {
            state.registry.finish(job_id, None);
            state.record(EventLevel::Error, request.failure_message(failure));
            state.hub.publish(Notification::JobFailed {
                job_id,
                kind,
                reason: failure.reason(),
            });
        }
    }
}

/// Resolve after `limit`, or never when there is no limit.
async fn expire(limit: Option<Duration>) -> Duration {
    match limit {
        Some(limit) => {
            tokio::time::sleep(limit).await;
            limit
        }
        None => std::future::pending().await,
    }
}

/// Output text kept for the [`JobResult`].
///
/// Lines are kept up to `limit` bytes; once a line does not fit, that line
/// and everything after it are dropped so the text stays a prefix of the
/// stream.
#[derive(Debug)]
struct Captured {
    text: String,
    limit: usize,
    truncated: bool,
}

impl Captured {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, line: &str) {
        if self.truncated {
            return;
        }
        if self.text.len() + line.len() + 1 > self.limit {
            self.truncated = true;
            return;
        }
        self.text.push_str(line);
        self.text.push('\n');
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_output_stops_at_first_line_over_limit() {
        let mut captured = Captured::new(16);
        captured.push("first");
        captured.push("a line that is too long");
        captured.push("short");

        assert_eq!(captured.text, "first\n");
        assert!(captured.truncated);
    }

    #[test]
    fn captured_output_keeps_lines_that_fit_exactly() {
        let mut captured = Captured::new(12);
        captured.push("hello");
        captured.push("world");

        assert_eq!(captured.text, "hello\nworld\n");
        assert!(!captured.truncated);
    }

    #[test]
    fn spawn_reservation_occupies_the_slot_without_activating_status() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = JobId::new_v4();
        let state = PlaneState {
            log: EventLog::open(dir.path(), 10).unwrap(),
            hub: BroadcastHub::default(),
            registry: StatusRegistry::new(),
            active_cancel: None,
            spawning: Some((job_id, JobKind::Upload)),
            snapshot_events: 50,
        };

        assert_eq!(state.occupant(), Some((job_id, JobKind::Upload)));
        assert!(!state.registry.get().job_active);
    }
}
