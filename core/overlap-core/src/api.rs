//! Typed Overlap server endpoints on top of a [`Transport`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{OverlapError, Result};
use crate::transport::{HttpMethod, Transport};
use crate::types::{
    Envelope, HeartbeatRequest, HeartbeatResult, LogBatch, LogEntry, LogsReceived,
    ServerVersion, StartSessionData, StartSessionRequest, MAX_LOG_BATCH,
};

/// Server calls give up after this long.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const START_SESSION_PATH: &str = "/api/v1/sessions/start";
pub const VERSION_PATH: &str = "/api/v1/version";
pub const LOGS_PATH: &str = "/api/v1/logs";

pub fn heartbeat_path(session_id: &str) -> String {
    format!("/api/v1/sessions/{}/heartbeat", session_id)
}

pub struct OverlapApi<T> {
    transport: T,
    timeout: Duration,
}

impl<T: Transport> OverlapApi<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Registers a session and returns the server-assigned session id.
    pub fn start_session(&self, request: &StartSessionRequest) -> Result<String> {
        let data: StartSessionData = self.call(HttpMethod::Post, START_SESSION_PATH, Some(request))?;
        data.session_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            tracing::warn!("No session_id in server response");
            OverlapError::server("No session_id in server response")
        })
    }

    pub fn heartbeat(&self, session_id: &str, files: Vec<String>) -> Result<HeartbeatResult> {
        self.call(
            HttpMethod::Post,
            &heartbeat_path(session_id),
            Some(&HeartbeatRequest { files }),
        )
    }

    /// Uploads log entries in batches the server accepts. Returns how many the
    /// server stored. Nothing is sent for an empty slice.
    pub fn send_logs(&self, entries: &[LogEntry]) -> Result<usize> {
        let mut received = 0;
        for chunk in entries.chunks(MAX_LOG_BATCH) {
            let ack: LogsReceived =
                self.call(HttpMethod::Post, LOGS_PATH, Some(&LogBatch { logs: chunk }))?;
            received += ack.received;
        }
        Ok(received)
    }

    pub fn version(&self) -> Result<ServerVersion> {
        self.call::<(), _>(HttpMethod::Get, VERSION_PATH, None)
    }

    fn call<B, R>(&self, method: HttpMethod, path: &str, body: Option<&B>) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| OverlapError::server(format!("Failed to serialize request: {}", e)))?;
        let response = self
            .transport
            .request(method, path, body.as_ref(), self.timeout)?;
        decode_envelope(response)
    }
}

fn decode_envelope<R: DeserializeOwned>(response: Value) -> Result<R> {
    serde_json::from_value::<Envelope<R>>(response)
        .map(|envelope| envelope.data)
        .map_err(|e| OverlapError::server(format!("Unexpected response shape: {}", e)))
}
