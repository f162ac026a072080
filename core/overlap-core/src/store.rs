//! File-backed plugin state in a per-user directory.
//!
//! # Layout
//!
//! ```text
//! ~/.claude/overlap/
//!   config.json                         server URL + tokens
//!   session.json                        {"session_id": "..."}
//!   pending/<md5(transcript)>.json      PendingSession
//!   transcripts/<md5(transcript)>.json  TranscriptBinding
//!   logs/                               hook log files
//! ```
//!
//! Every hook invocation is a separate process, so several of them may touch
//! these files at once. The store never locks:
//! - Reads degrade to "absent" on missing files, I/O errors, or corrupt JSON (logged).
//! - Writes go through a temp file + rename, so readers never observe partial
//!   documents, and propagate failures to the caller.
//! - Per-transcript records live in their own files, so concurrent registrations
//!   for different transcripts never overwrite each other.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs_err as fs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::{Config, ConfigOverrides};
use crate::error::{OverlapError, Result};
use crate::types::{CurrentSession, PendingSession, TranscriptBinding};

/// Overrides the state directory (used by tests and unusual installs).
pub const STATE_DIR_ENV: &str = "OVERLAP_HOME";

const CONFIG_FILE: &str = "config.json";
const SESSION_FILE: &str = "session.json";
const PENDING_DIR: &str = "pending";
const TRANSCRIPTS_DIR: &str = "transcripts";
const LOG_DIR: &str = "logs";

/// Returns the default state directory: `$OVERLAP_HOME` or `~/.claude/overlap`.
pub fn default_state_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or(OverlapError::HomeDirNotFound)?;
    Ok(home.join(".claude").join("overlap"))
}

/// Stable file name for a transcript identity.
fn transcript_key(transcript_path: &str) -> String {
    format!("{:x}", md5::compute(transcript_path.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StateStore { root: root.into() }
    }

    pub fn open_default() -> Result<Self> {
        default_state_dir().map(StateStore::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.join(SESSION_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    fn pending_path(&self, transcript_path: &str) -> PathBuf {
        self.root
            .join(PENDING_DIR)
            .join(format!("{}.json", transcript_key(transcript_path)))
    }

    fn binding_path(&self, transcript_path: &str) -> PathBuf {
        self.root
            .join(TRANSCRIPTS_DIR)
            .join(format!("{}.json", transcript_key(transcript_path)))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Config
    // ─────────────────────────────────────────────────────────────────────

    /// Loads config with overrides taken from the process environment.
    pub fn load_config(&self) -> Config {
        self.load_config_with(&ConfigOverrides::from_env())
    }

    pub fn load_config_with(&self, overrides: &ConfigOverrides) -> Config {
        self.stored_config().with_overrides(overrides)
    }

    /// The config file alone, without environment overrides.
    pub fn stored_config(&self) -> Config {
        read_or_absent(&self.config_path(), "config").unwrap_or_default()
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        let path = self.config_path();
        write_json_atomic(&path, config)?;
        tracing::info!(path = %path.display(), "Config saved");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Current session
    // ─────────────────────────────────────────────────────────────────────

    pub fn current_session(&self) -> Option<String> {
        read_or_absent::<CurrentSession>(&self.session_path(), "session")
            .map(|record| record.session_id)
            .filter(|id| !id.is_empty())
    }

    pub fn save_current_session(&self, session_id: &str) -> Result<()> {
        let path = self.session_path();
        write_json_atomic(
            &path,
            &CurrentSession {
                session_id: session_id.to_string(),
            },
        )?;
        tracing::info!(session_id, path = %path.display(), "Session saved");
        Ok(())
    }

    /// Removes `session.json`. A missing file is not an error.
    pub fn clear_current_session(&self) -> Result<()> {
        let path = self.session_path();
        remove_if_exists(&path)?;
        tracing::info!(path = %path.display(), "Session cleared");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pending registrations
    // ─────────────────────────────────────────────────────────────────────

    pub fn pending(&self, transcript_path: &str) -> Option<PendingSession> {
        read_or_absent(&self.pending_path(transcript_path), "pending session")
    }

    /// Writes (or supersedes) the pending record for `pending.transcript_path`.
    pub fn save_pending(&self, pending: &PendingSession) -> Result<()> {
        write_json_atomic(&self.pending_path(&pending.transcript_path), pending)
    }

    pub fn clear_pending(&self, transcript_path: &str) -> Result<()> {
        remove_if_exists(&self.pending_path(transcript_path))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transcript → session mapping
    // ─────────────────────────────────────────────────────────────────────

    pub fn registration(&self, transcript_path: &str) -> Option<TranscriptBinding> {
        read_or_absent::<TranscriptBinding>(&self.binding_path(transcript_path), "transcript mapping")
            .filter(|binding| !binding.session_id.is_empty())
    }

    pub fn registered_session(&self, transcript_path: &str) -> Option<String> {
        self.registration(transcript_path)
            .map(|binding| binding.session_id)
    }

    pub fn save_registration(
        &self,
        transcript_path: &str,
        session_id: &str,
        repo_name: Option<&str>,
    ) -> Result<()> {
        let binding = TranscriptBinding {
            transcript_path: transcript_path.to_string(),
            session_id: session_id.to_string(),
            repo_name: repo_name.map(str::to_string),
            registered_at: Utc::now(),
        };
        write_json_atomic(&self.binding_path(transcript_path), &binding)
    }
}

/// Reads a JSON document. `Ok(None)` when the file does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(OverlapError::LocalStateCorrupt {
                path: path.to_path_buf(),
                details: e.to_string(),
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| OverlapError::LocalStateCorrupt {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
}

fn read_or_absent<T: DeserializeOwned>(path: &Path, what: &str) -> Option<T> {
    match read_json(path) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "Unreadable {} file, treating as absent", what);
            None
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let write_failed = |source: io::Error| OverlapError::LocalStateWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().ok_or_else(|| {
        write_failed(io::Error::new(
            io::ErrorKind::InvalidInput,
            "state file path has no parent directory",
        ))
    })?;
    fs::create_dir_all(parent).map_err(write_failed)?;

    let content = serde_json::to_string_pretty(value).map_err(|e| write_failed(e.into()))?;

    let mut temp_file = NamedTempFile::new_in(parent).map_err(write_failed)?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(write_failed)?;
    temp_file.flush().map_err(write_failed)?;
    temp_file.persist(path).map_err(|e| write_failed(e.error))?;

    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OverlapError::LocalStateWriteFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
