use std::fs;
use std::path::Path;
use std::time::Duration;

use autopost_core::event::Event;
use autopost_events::{Notification, Observer};
use autopost_worker::command::JobCommand;
use autopost_worker::{Supervisor, SupervisorConfig};
use tempfile::TempDir;

/// A supervisor whose jobs run a throwaway `sh` script.
///
/// The scratch directory holds the script, the event logs, and the cookies
/// directory; it is removed when the harness is dropped.
pub struct Harness {
    pub dir: TempDir,
    pub supervisor: Supervisor,
}

/// Build a config running `sh <dir>/automation.sh <kind> <flags...>`.
///
/// Inside the script `$1` is the job kind; for login `$3` is the session,
/// for upload `$3` is the session, `$5` the media and `$7` the title.
pub fn script_config(dir: &Path, body: &str) -> SupervisorConfig {
    let script = dir.join("automation.sh");
    fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("write script");

    SupervisorConfig {
        command: JobCommand {
            interpreter: "sh".to_string(),
            script: script.to_string_lossy().into_owned(),
            working_dir: dir.to_path_buf(),
        },
        logs_dir: dir.join("logs"),
        cookies_dir: dir.join("cookies"),
        history_capacity: 200,
        snapshot_events: 50,
        observer_buffer: 256,
        job_timeout: Some(Duration::from_secs(30)),
    }
}

pub fn harness(body: &str) -> Harness {
    harness_with(body, |_| {})
}

/// Like [`harness`], with a hook to adjust the config first.
pub fn harness_with(body: &str, adjust: impl FnOnce(&mut SupervisorConfig)) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = script_config(dir.path(), body);
    adjust(&mut config);
    let supervisor = Supervisor::new(config).expect("supervisor");
    Harness { dir, supervisor }
}

/// Receive notifications until a `jobSucceeded` or `jobFailed` arrives.
pub async fn until_terminal(observer: &mut Observer) -> Vec<Notification> {
    let mut seen = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(10), observer.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("observer was closed");
        let done = matches!(
            next,
            Notification::JobSucceeded { .. } | Notification::JobFailed { .. }
        );
        seen.push(next);
        if done {
            return seen;
        }
    }
}

/// The events carried by `log` notifications, in order.
pub fn log_events(notifications: &[Notification]) -> Vec<Event> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Log(event) => Some(event.clone()),
            _ => None,
        })
        .collect()
}

/// Every line of every durable log file, oldest file first.
pub fn durable_lines(logs_dir: &Path) -> Vec<String> {
    let mut files: Vec<_> = fs::read_dir(logs_dir)
        .expect("logs dir")
        .map(|entry| entry.expect("entry").path())
        .collect();
    files.sort();

    files
        .iter()
        .flat_map(|path| {
            fs::read_to_string(path)
                .expect("read log")
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}
