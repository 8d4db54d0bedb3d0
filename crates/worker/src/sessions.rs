//! Read-only view of the sessions the automation script has logged in.
//!
//! A successful login leaves a credential file named
//! `tiktok_session-<name>.json` in the cookies directory; the session name
//! is recovered from the file name. The files themselves are owned by the
//! automation script and never touched here.

use std::fs;
use std::path::PathBuf;

/// File name prefix of a session credential file.
pub const SESSION_FILE_PREFIX: &str = "tiktok_session-";

const SESSION_FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    dir: PathBuf,
}

impl SessionRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Known session names, sorted.
    ///
    /// An unreadable directory yields an empty list.
    pub fn list(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Failed to read session directory"
                );
                return Vec::new();
            }
        };

        let mut sessions: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| session_name(&name).map(str::to_string))
            .collect();
        sessions.sort();
        sessions
    }
}

fn session_name(file_name: &str) -> Option<&str> {
    let rest = file_name.strip_prefix(SESSION_FILE_PREFIX)?;
    let name = rest.strip_suffix(SESSION_FILE_SUFFIX).unwrap_or(rest);
    (!name.is_empty()).then_some(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_name_strips_prefix_and_suffix() {
        assert_eq!(session_name("tiktok_session-alice.json"), Some("alice"));
        assert_eq!(session_name("tiktok_session-bob"), Some("bob"));
        assert_eq!(session_name("tiktok_session-.json"), None);
        assert_eq!(session_name("notes.txt"), None);
    }

    #[test]
    fn list_returns_sorted_session_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "tiktok_session-zoe.json",
            "tiktok_session-alice.json",
            "README.md",
        ] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }

        let registry = SessionRegistry::new(dir.path());
        assert_eq!(registry.list(), vec!["alice", "zoe"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path().join("absent"));
        assert!(registry.list().is_empty());
    }
}
