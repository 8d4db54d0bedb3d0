use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use autopost_events::hub::DEFAULT_OBSERVER_BUFFER;
use autopost_events::log_store::DEFAULT_CAPACITY;

use crate::command::JobCommand;

/// Default number of history events sent to a new observer.
pub const DEFAULT_SNAPSHOT_EVENTS: usize = 50;

/// Default wall-clock limit for one job.
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;

/// Supervisor configuration loaded from environment variables.
///
/// All fields have defaults suitable for running next to the automation
/// script. Invalid values fall back to the default with a warning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How jobs are launched.
    pub command: JobCommand,
    /// Directory of the daily event log files.
    pub logs_dir: PathBuf,
    /// Directory holding session credential files.
    pub cookies_dir: PathBuf,
    /// Events kept in memory.
    pub history_capacity: usize,
    /// History events included in a new observer's snapshot.
    pub snapshot_events: usize,
    /// Per-observer notification buffer.
    pub observer_buffer: usize,
    /// Kill a job that runs longer than this. `None` disables the limit.
    pub job_timeout: Option<Duration>,
}

impl SupervisorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default      |
    /// |--------------------------|--------------|
    /// | `AUTOMATION_DIR`         | `.`          |
    /// | `AUTOMATION_INTERPRETER` | `python3`    |
    /// | `AUTOMATION_SCRIPT`      | `cli.py`     |
    /// | `LOGS_DIR`               | `logs`       |
    /// | `COOKIES_DIR`            | `CookiesDir` |
    /// | `HISTORY_CAPACITY`       | `200`        |
    /// | `SNAPSHOT_EVENTS`        | `50`         |
    /// | `OBSERVER_BUFFER`        | `256`        |
    /// | `JOB_TIMEOUT_SECS`       | `3600` (`0` disables) |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let command = JobCommand {
            interpreter: env_string("AUTOMATION_INTERPRETER", defaults.command.interpreter),
            script: env_string("AUTOMATION_SCRIPT", defaults.command.script),
            working_dir: env_string("AUTOMATION_DIR", ".".to_string()).into(),
        };

        let timeout_secs = env_parse("JOB_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT_SECS);

        Self {
            command,
            logs_dir: env_string("LOGS_DIR", "logs".to_string()).into(),
            cookies_dir: env_string("COOKIES_DIR", "CookiesDir".to_string()).into(),
            history_capacity: env_parse("HISTORY_CAPACITY", defaults.history_capacity),
            snapshot_events: env_parse("SNAPSHOT_EVENTS", defaults.snapshot_events),
            observer_buffer: env_parse("OBSERVER_BUFFER", defaults.observer_buffer),
            job_timeout: timeout_from_secs(timeout_secs),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            command: JobCommand::default(),
            logs_dir: PathBuf::from("logs"),
            cookies_dir: PathBuf::from("CookiesDir"),
            history_capacity: DEFAULT_CAPACITY,
            snapshot_events: DEFAULT_SNAPSHOT_EVENTS,
            observer_buffer: DEFAULT_OBSERVER_BUFFER,
            job_timeout: timeout_from_secs(DEFAULT_JOB_TIMEOUT_SECS),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    parse_or(key, std::env::var(key).ok(), default)
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
