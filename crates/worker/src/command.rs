//! Per-kind command construction for the automation script.
//!
//! Every job runs `<interpreter> <script> <kind> <flags...>` in the
//! automation directory:
//!
//! | Kind     | Arguments                                         |
//! |----------|---------------------------------------------------|
//! | `login`  | `login -n <session>`                              |
//! | `upload` | `upload -u <session> -v <media> -t <title>`       |

use std::path::PathBuf;
use std::process::Stdio;

use autopost_core::job::JobRequest;
use tokio::process::Command;

/// How to invoke the automation script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    /// Executable to run, e.g. `python3`.
    pub interpreter: String,
    /// Script passed as the first argument. Skipped when empty so the
    /// interpreter can be the automation executable itself.
    pub script: String,
    /// Working directory of the child process.
    pub working_dir: PathBuf,
}

impl JobCommand {
    /// Full argument vector for `request`, excluding the interpreter.
    pub fn args(&self, request: &JobRequest) -> Vec<String> {
        let mut args = Vec::new();
        if !self.script.is_empty() {
            args.push(self.script.clone());
        }
        args.push(request.kind().as_str().to_string());

        match request {
            JobRequest::Login { session } => {
                args.extend(["-n".to_string(), session.clone()]);
            }
            JobRequest::Upload {
                session,
                media,
                title,
            } => {
                args.extend([
                    "-u".to_string(),
                    session.clone(),
                    "-v".to_string(),
                    media.clone(),
                    "-t".to_string(),
                    title.clone(),
                ]);
            }
        }
        args
    }

    /// Build the child process command with piped output.
    ///
    /// Stdin is closed so an interactive prompt fails fast instead of
    /// hanging, and `kill_on_drop(true)` kills the child if the supervisor
    /// drops it on timeout or cancellation.
    pub fn build(&self, request: &JobRequest) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(self.args(request))
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for JobCommand {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            script: "cli.py".to_string(),
            working_dir: PathBuf::from("."),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
