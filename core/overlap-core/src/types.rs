//! Serialized types: on-disk session records and server request/response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::probe::EnvironmentInfo;

/// `session.json`: the single currently active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSession {
    pub session_id: String,
}

/// Draft registration for a transcript the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSession {
    pub transcript_path: String,
    pub session_id: String,
    pub device_name: String,
    pub hostname: String,
    pub is_remote: bool,
    pub worktree: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingSession {
    pub fn new(transcript_path: &str, session_id: &str, cwd: &str, env: EnvironmentInfo) -> Self {
        Self {
            transcript_path: transcript_path.to_string(),
            session_id: session_id.to_string(),
            device_name: env.device_name,
            hostname: env.hostname,
            is_remote: env.is_remote,
            worktree: cwd.to_string(),
            repo_name: env.git.repo_name,
            remote_url: env.git.remote_url,
            branch: env.git.branch,
            created_at: Utc::now(),
        }
    }
}

/// Server-confirmed mapping from a transcript to its canonical session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptBinding {
    pub transcript_path: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    pub registered_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Server payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /api/v1/sessions/start`.
///
/// The server rejects explicit nulls for the git fields, so absent values are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub session_id: String,
    pub device_name: String,
    pub hostname: String,
    pub is_remote: bool,
    pub worktree: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl StartSessionRequest {
    pub fn from_environment(session_id: &str, cwd: &str, env: EnvironmentInfo) -> Self {
        Self {
            session_id: session_id.to_string(),
            device_name: env.device_name,
            hostname: env.hostname,
            is_remote: env.is_remote,
            worktree: cwd.to_string(),
            repo_name: env.git.repo_name,
            remote_url: env.git.remote_url,
            branch: env.git.branch,
        }
    }
}

impl From<&PendingSession> for StartSessionRequest {
    fn from(pending: &PendingSession) -> Self {
        Self {
            session_id: pending.session_id.clone(),
            device_name: pending.device_name.clone(),
            hostname: pending.hostname.clone(),
            is_remote: pending.is_remote,
            worktree: pending.worktree.clone(),
            repo_name: pending.repo_name.clone(),
            remote_url: pending.remote_url.clone(),
            branch: pending.branch.clone(),
        }
    }
}

/// Body of `POST /api/v1/sessions/{id}/heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub files: Vec<String>,
}

/// Every successful server response wraps its payload in `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionData {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// The scope shape is up to the server; it is only logged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HeartbeatResult {
    #[serde(default)]
    pub semantic_scope: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerVersion {
    pub version: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub releases: Option<String>,
}

/// Largest batch `POST /api/v1/logs` accepts.
pub const MAX_LOG_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Failure details attached to a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// One hook log line shipped to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<LogError>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            hook: None,
            session_id: None,
            message: message.into(),
            data: None,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Body of `POST /api/v1/logs`.
#[derive(Debug, Clone, Serialize)]
pub struct LogBatch<'a> {
    pub logs: &'a [LogEntry],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogsReceived {
    #[serde(default)]
    pub received: usize,
}
